use std::sync::Arc;
use std::time::Duration;

use tracing::{ info, instrument };

use super::episodes::{ Episode, EpisodeError, EpisodeId, EpisodeSource, EpisodeStats };
use crate::engine::components::{ Pose, SceneSnapshot };
use crate::engine::loaders::Fetcher;
use crate::engine::managers::QueryCache;
use crate::engine::systems::SequencePlayer;

/// Connects the episode picker to the player.
///
/// Selecting an episode fetches it (through a cache), replaces the played
/// sequence and records the goal pose that should be drawn next to it.
pub struct PlaybackSession<F> {
    episodes: EpisodeSource<F>,
    episode_cache: QueryCache<EpisodeId, Episode>,
    stats_cache: QueryCache<(), EpisodeStats>,
    player: SequencePlayer<SceneSnapshot>,
    current: Option<Arc<Episode>>,
}

impl<F: Fetcher> PlaybackSession<F> {
    pub fn new(episodes: EpisodeSource<F>, player: SequencePlayer<SceneSnapshot>, cache_ttl: Duration) -> Self {
        Self {
            episodes,
            episode_cache: QueryCache::new(cache_ttl),
            stats_cache: QueryCache::new(cache_ttl),
            player,
            current: None,
        }
    }

    pub fn player(&self) -> &SequencePlayer<SceneSnapshot> {
        &self.player
    }

    pub fn episodes(&self) -> &EpisodeSource<F> {
        &self.episodes
    }

    pub fn current_episode(&self) -> Option<&Arc<Episode>> {
        self.current.as_ref()
    }

    pub fn goal(&self) -> Option<Pose> {
        self.current.as_ref().map(|episode| episode.goal)
    }

    /// Scatter-plot points, fetched once per cache lifetime.
    pub async fn stats(&self) -> Result<Arc<EpisodeStats>, EpisodeError> {
        self.stats_cache.get_or_try_load((), || self.episodes.fetch_stats()).await
    }

    /// Loads episode `id` and starts playing it from its first frame.
    ///
    /// On failure the player and the current episode are left untouched.
    #[instrument(skip_all, fields(episode = %id))]
    pub async fn select_episode(&mut self, id: EpisodeId) -> Result<Arc<Episode>, EpisodeError> {
        let episodes = &self.episodes;
        let episode = self.episode_cache
            .get_or_try_load(id.clone(), || episodes.fetch_episode(&id)).await?;

        self.player.set_sequence(episode.points.clone());
        self.current = Some(Arc::clone(&episode));
        info!(frames = episode.points.len(), state = %self.player.state(), "episode selected");
        Ok(episode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::loaders::MemoryFetcher;
    use crate::engine::systems::PlayerState;
    use std::sync::Mutex;
    use url::Url;

    fn episode_json(id: u64, frames: usize) -> String {
        let points: Vec<String> = (0..frames)
            .map(|i| format!(r#"{{ "timeFromStart": {i}, "arm": {{ "j": {i} }} }}"#))
            .collect();
        format!(
            r#"{{ "episodeId": {id}, "goal": {{ "position": {{ "x": {id}, "y": 0 }}, "rotation": {{ "theta": 0 }} }},
                 "points": [{}] }}"#,
            points.join(",")
        )
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn session(seen: Arc<Mutex<Vec<f64>>>) -> PlaybackSession<Arc<MemoryFetcher>> {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .with_body(url("http://h/data/arm/episode_1.json"), episode_json(1, 3))
                .with_body(url("http://h/data/arm/episode_2.json"), episode_json(2, 5))
                .with_status(url("http://h/data/arm/episode_3.json"), 500)
                .with_body(url("http://h/data/arm/stats.json"), "[]")
        );
        let player = SequencePlayer::new(Vec::<SceneSnapshot>::new(), move |frame: &SceneSnapshot| {
            seen.lock().unwrap().push(frame.joint("arm.j").unwrap_or(f64::NAN));
        }).unwrap();
        PlaybackSession::new(EpisodeSource::new(fetcher, url("http://h/"), "arm"), player, Duration::from_secs(300))
    }

    #[tokio::test(start_paused = true)]
    async fn selecting_an_episode_plays_it() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut session = session(Arc::clone(&seen));
        assert_eq!(session.player().state(), PlayerState::Disabled);

        let episode = session.select_episode(EpisodeId::Number(1)).await.unwrap();
        assert_eq!(episode.points.len(), 3);
        assert_eq!(session.goal().map(|g| g.translation[0]), Some(1.0));
        assert_eq!(session.player().state(), PlayerState::Playing);

        let mut state = session.player().subscribe_state();
        state.wait_for(|s| *s == PlayerState::Completed).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0.0, 1.0, 2.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_episodes_restarts_from_frame_zero() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut session = session(Arc::clone(&seen));
        session.select_episode(EpisodeId::Number(2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        session.select_episode(EpisodeId::Number(1)).await.unwrap();
        assert_eq!(session.player().frame_index(), 0);
        assert_eq!(session.player().len(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![0.0, 1.0, 0.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn episodes_are_cached() {
        let mut session = session(Arc::default());
        session.select_episode(EpisodeId::Number(1)).await.unwrap();
        session.select_episode(EpisodeId::Number(1)).await.unwrap();
        let requests = session.episodes().fetcher().request_count(&url("http://h/data/arm/episode_1.json"));
        assert_eq!(requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stats_are_fetched_once() {
        let session = session(Arc::default());
        assert!(session.stats().await.unwrap().is_empty());
        session.stats().await.unwrap();
        let requests = session.episodes().fetcher().request_count(&url("http://h/data/arm/stats.json"));
        assert_eq!(requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_selection_keeps_the_current_episode() {
        let mut session = session(Arc::default());
        session.select_episode(EpisodeId::Number(1)).await.unwrap();
        let err = session.select_episode(EpisodeId::Number(3)).await.unwrap_err();
        assert!(matches!(err, EpisodeError::Fetch(_)));
        assert_eq!(session.current_episode().map(|e| e.episode_id.clone()), Some(EpisodeId::Number(1)));
    }
}
