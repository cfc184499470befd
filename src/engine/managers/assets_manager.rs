use std::sync::Arc;
use std::time::Duration;

use tracing::{ debug, instrument };
use url::Url;

use super::query_cache::QueryCache;
use crate::engine::components::LoadedAsset;
use crate::engine::loaders::{ AssetLoader, Fetcher, LoadError };

/// Loads each model once per time-to-live and hands out independent copies.
///
/// The cached asset is shared read-only. Anything that poses a model goes
/// through [`AssetsManager::get_asset_copy`].
#[derive(Debug)]
pub struct AssetsManager<F> {
    loader: AssetLoader<F>,
    cache: QueryCache<Url, LoadedAsset>,
}

impl<F: Fetcher> AssetsManager<F> {
    pub fn new(loader: AssetLoader<F>, ttl: Duration) -> Self {
        Self {
            loader,
            cache: QueryCache::new(ttl),
        }
    }

    pub fn loader(&self) -> &AssetLoader<F> {
        &self.loader
    }

    /// Shared cached asset, loading it when it is missing or stale.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn asset(&self, url: &Url) -> Result<Arc<LoadedAsset>, LoadError> {
        self.cache.get_or_try_load(url.clone(), || self.loader.load(url)).await
    }

    /// Private copy of the asset with its own pose state.
    pub async fn get_asset_copy(&self, url: &Url) -> Result<LoadedAsset, LoadError> {
        let shared = self.asset(url).await?;
        let copy = shared.instantiate();
        debug!(%url, instance = %copy.instance_id(), "asset copy created");
        Ok(copy)
    }

    pub fn invalidate(&self, url: &Url) -> bool {
        self.cache.invalidate(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::loaders::MemoryFetcher;

    const ARM: &str = r#"<robot name="arm">
        <link name="base"><visual><geometry><mesh filename="base.obj"/></geometry></visual></link>
        <joint name="shoulder" type="continuous"><parent link="base"/><child link="upper"/></joint>
    </robot>"#;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn manager() -> AssetsManager<Arc<MemoryFetcher>> {
        let fetcher = Arc::new(
            MemoryFetcher::new()
                .with_body(url("https://host/arm/arm.urdf"), ARM)
                .with_body(url("https://host/arm/base.obj"), "v 0 0 0")
        );
        AssetsManager::new(AssetLoader::new(fetcher), Duration::from_secs(300))
    }

    #[tokio::test(start_paused = true)]
    async fn second_request_is_served_from_cache() {
        let manager = manager();
        let source = url("https://host/arm/arm.urdf");
        let first = manager.asset(&source).await.unwrap();
        let second = manager.asset(&source).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.loader().fetcher().request_count(&source), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn copies_have_their_own_identity_and_pose() {
        let manager = manager();
        let source = url("https://host/arm/arm.urdf");
        let mut left = manager.get_asset_copy(&source).await.unwrap();
        let right = manager.get_asset_copy(&source).await.unwrap();
        assert_ne!(left.instance_id(), right.instance_id());

        left.set_joint_value("shoulder", 1.5).unwrap();
        assert_eq!(right.joint_value("shoulder"), Some(0.0));
        assert_eq!(manager.asset(&source).await.unwrap().joint_value("shoulder"), Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_loads_are_retried() {
        let manager = manager();
        let missing = url("https://host/other/missing.urdf");
        assert!(manager.asset(&missing).await.is_err());
        assert!(manager.asset(&missing).await.is_err());
        assert_eq!(manager.loader().fetcher().request_count(&missing), 2);
    }
}
