pub mod asset_loader;
pub mod error;
pub mod fetcher;
pub mod gltf_loader;
pub mod urdf_loader;

pub use asset_loader::{ AssetLoader, LoadProgress, LoaderOptions };
pub use error::{ FetchError, LoadError, ParseError };
pub use fetcher::{ Fetcher, HttpFetcher, MemoryFetcher };
