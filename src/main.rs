//! `robot-playback`: loads a robot model, then plays an episode or a joint
//! trajectory against it while logging every frame.
//!
//! Episodes record their joints per group (`leftArm.joint0`). With
//! `--group leftArm --group rightArm --joint-prefix iiwa_` each group drives
//! its own copy of the model, `leftArm.joint0` becoming `iiwa_joint0` of the
//! first copy. Without `--group` one copy takes the snapshot joints as named.

use std::path::PathBuf;
use std::sync::{ Arc, Mutex, PoisonError };
use std::time::Duration;

use anyhow::{ bail, Context, Result };
use clap::Parser;
use tracing::{ debug, info, warn };
use tracing_subscriber::EnvFilter;

use robot_playback::config::DEFAULT_BASE_URL;
use robot_playback::engine::utils::absolute_url;
use robot_playback::viewer::read_trajectory_file;
use robot_playback::{
    AssetLoader,
    AssetsManager,
    EpisodeId,
    EpisodeSource,
    HttpFetcher,
    LoadedAsset,
    PlaybackSession,
    PlayerState,
    SceneSnapshot,
    SequencePlayer,
    ViewerConfig,
};

const DEFAULT_LOG_FILTER: &str = "robot_playback=info,warn";

/// `RUST_LOG` as given when it parses, the default otherwise.
fn log_filter(rust_log: Option<String>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[derive(Parser, Debug)]
#[command(name = "robot-playback", version)]
#[command(about = "Load a robot model and play back a recorded trajectory")]
struct Args {
    /// Robot description (URDF or glTF), absolute or relative to the base URL
    #[arg(long, env = "ROBOT_PLAYBACK_MODEL")]
    model: String,

    /// Episode to fetch from data/<robot>/episode_<id>.json
    #[arg(long, env = "ROBOT_PLAYBACK_EPISODE", requires = "robot", conflicts_with = "trajectory")]
    episode: Option<String>,

    /// Robot data directory name, e.g. iiwa
    #[arg(long, env = "ROBOT_PLAYBACK_ROBOT")]
    robot: Option<String>,

    /// Local joint trajectory JSON file
    #[arg(long, env = "ROBOT_PLAYBACK_TRAJECTORY")]
    trajectory: Option<PathBuf>,

    /// Snapshot joint group driving one copy of the model, e.g. leftArm
    #[arg(long = "group", env = "ROBOT_PLAYBACK_GROUPS", value_delimiter = ',')]
    groups: Vec<String>,

    /// Prepended to a group's joint names to get the model's, e.g. iiwa_
    #[arg(long, env = "ROBOT_PLAYBACK_JOINT_PREFIX", default_value = "")]
    joint_prefix: String,

    #[arg(long, env = "ROBOT_PLAYBACK_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Milliseconds between frames (10-50)
    #[arg(long, env = "ROBOT_PLAYBACK_TICK_MS", default_value_t = 20)]
    tick_ms: u64,

    #[arg(long, env = "ROBOT_PLAYBACK_CACHE_TTL_SECS", default_value_t = 300)]
    cache_ttl_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok()))
        .init();

    let args = Args::parse();
    let config = ViewerConfig::new(&args.base_url, args.tick_ms, Duration::from_secs(args.cache_ttl_secs))
        .context("invalid configuration")?;

    let fetcher = Arc::new(HttpFetcher::default());
    let assets = AssetsManager::new(AssetLoader::new(Arc::clone(&fetcher)), config.cache_ttl);

    let model_url = absolute_url(&config.base_url, &args.model)
        .with_context(|| format!("invalid model path {}", args.model))?;
    let groups: Vec<Option<String>> = if args.groups.is_empty() {
        vec![None]
    } else {
        args.groups.into_iter().map(Some).collect()
    };

    // One load, one copy per group
    let mut instances = Vec::with_capacity(groups.len());
    for group in groups {
        let asset = assets
            .get_asset_copy(&model_url).await
            .with_context(|| format!("failed to load {model_url}"))?;
        instances.push(Instance { group, asset });
    }
    info!(
        model = %model_url,
        copies = instances.len(),
        joints = instances.first().map_or(0, |i| i.asset.joint_positions().len()),
        "model ready"
    );

    let instances = Arc::new(Mutex::new(instances));
    let posed = Arc::clone(&instances);
    let joint_prefix = args.joint_prefix;
    let player = SequencePlayer::new(Vec::<SceneSnapshot>::new(), move |frame: &SceneSnapshot| {
        let mut instances = posed.lock().unwrap_or_else(PoisonError::into_inner);
        let applied: usize = instances.iter_mut().map(|instance| instance.apply(frame, &joint_prefix)).sum();
        debug!(t = frame.time_from_start, applied, "frame");
    })?.with_tick_interval(config.tick_interval);

    let state = match (args.episode, args.trajectory) {
        (Some(id), _) => {
            let Some(robot_name) = args.robot else {
                bail!("--episode needs --robot");
            };
            let source = EpisodeSource::new(fetcher, config.base_url.clone(), robot_name);
            let mut session = PlaybackSession::new(source, player, config.cache_ttl);
            let episode = session
                .select_episode(EpisodeId::from(id.as_str())).await
                .with_context(|| format!("failed to load episode {id}"))?;
            info!(episode = %episode.episode_id, duration = episode.points.duration(), "playing episode");
            play_to_end(session.player()).await?
        }
        (None, Some(path)) => {
            let sequence = read_trajectory_file(&path).await?;
            info!(path = %path.display(), points = sequence.len(), "playing trajectory");
            player.set_sequence(sequence);
            play_to_end(&player).await?
        }
        (None, None) => {
            info!("no episode or trajectory given, nothing to play");
            return Ok(());
        }
    };

    let instances = instances.lock().unwrap_or_else(PoisonError::into_inner);
    report(&instances, state);
    Ok(())
}

/// A posed copy of the model and the snapshot group that drives it.
struct Instance {
    group: Option<String>,
    asset: LoadedAsset,
}

impl Instance {
    fn apply(&mut self, frame: &SceneSnapshot, joint_prefix: &str) -> usize {
        match &self.group {
            Some(group) => self.asset.apply_group(frame, group, |joint| format!("{joint_prefix}{joint}")),
            None => self.asset.apply_snapshot(frame),
        }
    }
}

async fn play_to_end(player: &SequencePlayer<SceneSnapshot>) -> Result<PlayerState> {
    let mut state = player.subscribe_state();
    tokio::select! {
        finished = state.wait_for(|s| matches!(s, PlayerState::Completed | PlayerState::Disabled)) => {
            Ok(*finished.context("player went away")?)
        }
        interrupted = tokio::signal::ctrl_c() => {
            interrupted.context("failed to listen for ctrl-c")?;
            warn!(frame = player.frame_index(), "interrupted");
            player.play_pause();
            Ok(player.state())
        }
    }
}

fn report(instances: &[Instance], state: PlayerState) {
    info!(%state, "playback finished");
    for instance in instances {
        let group = instance.group.as_deref().unwrap_or("-");
        for (joint, value) in instance.asset.joint_positions() {
            info!(group, instance = %instance.asset.instance_id(), joint = %joint, value, "final joint position");
        }
    }
}
