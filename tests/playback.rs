use std::sync::{ Arc, Mutex };
use std::time::Duration;

use robot_playback::engine::components::{ SceneSnapshot, Sequence };
use robot_playback::engine::loaders::{ AssetLoader, MemoryFetcher };
use robot_playback::engine::systems::{ PlayerError, PlayerState, SequencePlayer, TickInterval };
use robot_playback::viewer::{ parse_joint_trajectory, Episode };
use url::Url;

type Seen = Arc<Mutex<Vec<usize>>>;

fn indexed_player(len: usize) -> (SequencePlayer<usize>, Seen) {
    let seen = Seen::default();
    let sink = Arc::clone(&seen);
    let player = SequencePlayer::new(Vec::<usize>::new(), move |frame: &usize| {
        sink.lock().unwrap().push(*frame);
    }).unwrap();
    player.set_sequence((0..len).collect::<Vec<_>>());
    (player, seen)
}

async fn run_to_completion<T: Send + Sync + 'static>(player: &SequencePlayer<T>) {
    let mut state = player.subscribe_state();
    state.wait_for(|s| *s == PlayerState::Completed).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn every_frame_is_reported_exactly_once_in_order() {
    for len in [2, 3, 7, 50] {
        let (player, seen) = indexed_player(len);
        run_to_completion(&player).await;
        assert_eq!(*seen.lock().unwrap(), (0..len).collect::<Vec<_>>(), "length {len}");
        assert_eq!(player.state(), PlayerState::Completed);
    }
}

#[tokio::test(start_paused = true)]
async fn frames_advance_one_per_tick() {
    let (player, _seen) = indexed_player(1000);
    let mut previous = player.frame_index();
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let index = player.frame_index();
        assert!(index <= previous + 1, "jumped from {previous} to {index}");
        previous = index;
    }
    assert!(previous > 0);
}

#[tokio::test(start_paused = true)]
async fn pausing_does_not_change_the_remaining_frames() {
    let len = 8;
    for pause_at in 0..len - 1 {
        let (player, seen) = indexed_player(len);
        tokio::time::sleep(Duration::from_millis(20 * pause_at as u64 + 5)).await;
        assert_eq!(player.frame_index(), pause_at);

        player.play_pause();
        assert_eq!(player.state(), PlayerState::Paused);
        tokio::time::sleep(Duration::from_millis(500)).await;
        player.play_pause();
        run_to_completion(&player).await;

        assert_eq!(*seen.lock().unwrap(), (0..len).collect::<Vec<_>>(), "paused at {pause_at}");
    }
}

#[tokio::test(start_paused = true)]
async fn empty_sequence_ignores_play_pause() {
    let (player, seen) = indexed_player(0);
    assert_eq!(player.state(), PlayerState::Disabled);

    player.play_pause();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(player.state(), PlayerState::Disabled);
    assert_eq!(player.frame_index(), 0);
    assert_eq!(player.seek(0), Err(PlayerError::Disabled));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn seek_outcome_depends_only_on_the_target() {
    for start in [PlayerState::Playing, PlayerState::Paused, PlayerState::Completed] {
        let (player, _seen) = indexed_player(5);
        match start {
            PlayerState::Paused => player.play_pause(),
            PlayerState::Completed => run_to_completion(&player).await,
            _ => {}
        }
        assert_eq!(player.state(), start);

        for index in 0..4 {
            player.seek(index).unwrap();
            assert_eq!(player.state(), PlayerState::Paused);
        }
        player.seek(4).unwrap();
        assert_eq!(player.state(), PlayerState::Completed);
        assert_eq!(player.seek(5), Err(PlayerError::SeekOutOfRange { index: 5, len: 5 }));
    }
}

#[tokio::test(start_paused = true)]
async fn seeks_notify_once_per_index_change() {
    let (player, seen) = indexed_player(10);
    player.seek(3).unwrap();
    player.seek(3).unwrap();
    player.seek(9).unwrap();
    player.seek(0).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![0, 3, 9, 0]);
}

#[tokio::test(start_paused = true)]
async fn reassigning_while_playing_leaves_a_single_schedule() {
    let (player, seen) = indexed_player(100);
    tokio::time::sleep(Duration::from_millis(30)).await;
    for _ in 0..5 {
        player.set_sequence((100..200).collect::<Vec<_>>());
    }
    seen.lock().unwrap().clear();

    tokio::time::sleep(Duration::from_millis(110)).await;
    assert_eq!(*seen.lock().unwrap(), vec![101, 102, 103, 104, 105]);
}

#[tokio::test(start_paused = true)]
async fn imported_trajectory_plays_through_the_player() {
    let sequence: Sequence = parse_joint_trajectory(
        r#"{ "joint_names": ["j1"],
             "points": [ { "time_from_start": 0, "positions": [0] },
                         { "time_from_start": 1, "positions": [1] },
                         { "time_from_start": 2, "positions": [2] } ] }"#
    ).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let player = SequencePlayer::new(sequence.clone(), move |frame: &SceneSnapshot| {
        sink.lock().unwrap().push(frame.joint("j1").unwrap());
    }).unwrap().with_tick_interval(TickInterval::from_millis(10).unwrap());

    assert_eq!(player.state(), PlayerState::Initial);
    player.play_pause();
    let mut state = player.subscribe_state();
    state.wait_for(|s| *s == PlayerState::Completed).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![0.0, 1.0, 2.0]);
    assert_eq!(player.current_frame().as_ref(), sequence.last());
}

const IIWA: &str = r#"<robot name="iiwa">
  <joint name="iiwa_joint0" type="revolute">
    <limit lower="-2.9" upper="2.9" effort="300" velocity="1.5"/>
  </joint>
  <joint name="iiwa_joint1" type="revolute">
    <limit lower="-2.0" upper="2.0" effort="300" velocity="1.5"/>
  </joint>
</robot>"#;

const TWO_ARM_EPISODE: &str = r#"{
    "episodeId": 3,
    "goal": { "position": { "x": 0.4, "y": 0.1 }, "rotation": { "theta": 0.0 } },
    "points": [
        { "timeFromStart": 0.0,
          "leftArm": { "joint0": 0.0, "joint1": 0.0 },
          "rightArm": { "joint0": 0.0, "joint1": 0.0 } },
        { "timeFromStart": 0.1,
          "leftArm": { "joint0": 0.3, "joint1": 0.2 },
          "rightArm": { "joint0": -0.3, "joint1": -0.2 } },
        { "timeFromStart": 0.2,
          "leftArm": { "joint0": 0.7, "joint1": 0.4 },
          "rightArm": { "joint0": -0.7, "joint1": -0.4 } }
    ]
}"#;

#[tokio::test(start_paused = true)]
async fn episode_groups_drive_separate_instances_of_one_model() {
    let model_url = Url::parse("https://host/models/iiwa/iiwa.urdf").unwrap();
    let loader = AssetLoader::new(MemoryFetcher::new().with_body(model_url.clone(), IIWA));
    let model = loader.load(&model_url).await.unwrap();
    let arms = Arc::new(Mutex::new([model.instantiate(), model.instantiate()]));

    let episode_url = Url::parse("https://host/data/iiwa/episode_3.json").unwrap();
    let episode = Episode::from_json(&episode_url, TWO_ARM_EPISODE.as_bytes()).unwrap();

    let posed = Arc::clone(&arms);
    let player = SequencePlayer::new(Vec::<SceneSnapshot>::new(), move |frame: &SceneSnapshot| {
        let mut arms = posed.lock().unwrap();
        let [left, right] = &mut *arms;
        let iiwa = |joint: &str| format!("iiwa_{joint}");
        assert_eq!(left.apply_group(frame, "leftArm", iiwa), 2);
        assert_eq!(right.apply_group(frame, "rightArm", iiwa), 2);
    }).unwrap();
    player.set_sequence(episode.points);
    run_to_completion(&player).await;

    let arms = arms.lock().unwrap();
    let [left, right] = &*arms;
    assert_eq!(left.joint_value("iiwa_joint0"), Some(0.7));
    assert_eq!(left.joint_value("iiwa_joint1"), Some(0.4));
    assert_eq!(right.joint_value("iiwa_joint0"), Some(-0.7));
    assert_eq!(right.joint_value("iiwa_joint1"), Some(-0.4));
    assert_eq!(model.joint_value("iiwa_joint0"), Some(0.0));
}

