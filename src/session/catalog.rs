//! The capability sets each session kind may call.

use super::subagent::SubAgent;
use crate::capabilities::{
    ArtifactTarget, CapabilityRegistry, CaptureNetwork, CropHistory, DetectInputLimit,
    DiagnoseError, EstimateTokens, FetchPage, Finalize, FinalizeArtifact, HumanAcceptance,
    MeasureLog, PreprocessHtml, ReadDebugRecent, ReadMessages, RecordMessage, StaticExtract,
    WriteArtifact,
};
use crate::llm::ServiceSet;
use std::sync::Arc;

/// Static parser sub-session: extraction, fetching, its own artifact log.
pub fn static_parser_registry() -> anyhow::Result<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    registry.register(StaticExtract::new()?);
    registry.register(FetchPage);
    registry.register(WriteArtifact::pinned(ArtifactTarget::Static));
    registry.register(RecordMessage);
    registry.register(ReadDebugRecent);
    Ok(registry)
}

/// Network capture sub-session: capture, preprocessing, its own artifact log.
pub fn network_capture_registry() -> anyhow::Result<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    registry.register(CaptureNetwork);
    registry.register(PreprocessHtml::new()?);
    registry.register(WriteArtifact::pinned(ArtifactTarget::Dynamic));
    registry.register(RecordMessage);
    registry.register(ReadDebugRecent);
    Ok(registry)
}

/// Everything the coordinator may call, including the two delegations.
pub fn top_level_registry(services: &ServiceSet) -> anyhow::Result<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new();
    registry.register(FetchPage);
    registry.register(StaticExtract::new()?);
    registry.register(SubAgent::static_parser(
        Arc::clone(&services.static_parser),
        Arc::new(static_parser_registry()?),
    ));
    registry.register(SubAgent::network_capture(
        Arc::clone(&services.network_capture),
        Arc::new(network_capture_registry()?),
    ));
    registry.register(CaptureNetwork);
    registry.register(PreprocessHtml::new()?);
    registry.register(RecordMessage);
    registry.register(ReadMessages);
    registry.register(MeasureLog);
    registry.register(EstimateTokens);
    registry.register(CropHistory);
    registry.register(DiagnoseError);
    registry.register(DetectInputLimit);
    registry.register(ReadDebugRecent);
    registry.register(WriteArtifact::any_target());
    registry.register(FinalizeArtifact);
    registry.register(HumanAcceptance);
    registry.register(Finalize);
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::ScriptedService;

    #[test]
    fn sub_registries_are_scoped() {
        let registry = static_parser_registry().unwrap();
        assert_eq!(
            registry.names(),
            vec![
                "code_maintainer_agent_write",
                "fetch_page_html",
                "read_debug_recent",
                "record_message",
                "static_extract_html_candidates",
            ]
        );
        let registry = network_capture_registry().unwrap();
        assert!(registry.contains("capture_network"));
        assert!(registry.contains("call_html_preprocessor"));
        assert!(!registry.contains("call_network_capture_agent"));
    }

    #[test]
    fn top_level_registry_has_the_full_catalog() {
        let services = ServiceSet::uniform(Arc::new(ScriptedService::ok(&[])));
        let registry = top_level_registry(&services).unwrap();
        assert_eq!(registry.len(), 18);
        for name in [
            "call_static_parser_agent",
            "call_network_capture_agent",
            "code_maintainer_agent_finalize",
            "human_acceptance_flow",
            "finalize",
        ] {
            assert!(registry.contains(name), "{name}");
        }
        assert!(registry.describe().contains("- finalize: "));
    }
}
