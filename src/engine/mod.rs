pub mod components;
pub mod loaders;
pub mod managers;
pub mod systems;
pub mod utils;

// Re-export all commonly used items for easy access
pub use components::*;
pub use loaders::*;
pub use managers::*;
pub use systems::*;
