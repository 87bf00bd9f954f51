//! Candidate sources.
//!
//! A pass takes one snapshot of the library before resolving anything. The snapshot
//! comes either from the host's item store ([`library::HostLibrarySource`]) or from an
//! external JSON-RPC citekey service ([`rpc::RpcSource`], behind the `rpc` feature).

pub mod library;
pub mod rpc;

use crate::candidate::CandidateRecord;
use crate::config::{DataSource, PassConfig};
use crate::Result;
use async_trait::async_trait;
use library::{HostLibrarySource, ItemStore};

/// Delivers one snapshot of library records.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Gathers every candidate record. Any error aborts the pass.
    async fn gather(&self) -> Result<Vec<CandidateRecord>>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Builds the source selected by `config.data_source`.
///
/// # Errors
///
/// Returns `CitekeyError::Unsupported` when the external service is selected but the
/// crate was built without the `rpc` feature.
pub fn candidate_source<'s>(
    config: &PassConfig,
    store: &'s dyn ItemStore,
) -> Result<Box<dyn CandidateSource + 's>> {
    match config.data_source {
        DataSource::HostLibrary => Ok(Box::new(HostLibrarySource::new(store))),
        #[cfg(feature = "rpc")]
        DataSource::ExternalRpc => Ok(Box::new(rpc::RpcSource::new(config.rpc_endpoint()))),
        #[cfg(not(feature = "rpc"))]
        DataSource::ExternalRpc => Err(crate::CitekeyError::Unsupported(format!(
            "{} requires the `rpc` feature",
            DataSource::ExternalRpc
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CitekeyError;
    use crate::source::library::LibraryItem;

    struct EmptyStore;

    #[async_trait]
    impl ItemStore for EmptyStore {
        async fn all_items(&self) -> Result<Option<Vec<LibraryItem>>> {
            Ok(Some(Vec::new()))
        }

        async fn item_by_id(&self, _id: u64) -> Result<Option<LibraryItem>> {
            Err(CitekeyError::Store("not called".to_string()))
        }
    }

    #[test]
    fn test_host_library_is_default_source() {
        let source = candidate_source(&PassConfig::default(), &EmptyStore).unwrap();
        assert_eq!(source.name(), "host-library");
    }

    #[cfg(feature = "rpc")]
    #[test]
    fn test_external_rpc_source() {
        let config = PassConfig {
            data_source: DataSource::ExternalRpc,
            ..Default::default()
        };
        let source = candidate_source(&config, &EmptyStore).unwrap();
        assert_eq!(source.name(), "external-rpc");
    }
}
