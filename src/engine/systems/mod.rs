pub mod sequence_player;
pub mod timer;

pub use sequence_player::{ PlayerError, PlayerState, SequencePlayer, TickInterval, DEFAULT_TICK_INTERVAL };
pub use timer::RepeatingTimer;
