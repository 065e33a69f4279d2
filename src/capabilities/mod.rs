pub mod artifacts;
pub mod candidates;
pub mod collaborators;
pub mod context;
pub mod context_tools;
pub mod debug;
pub mod diagnose;
pub mod page;
pub mod preprocess;
pub mod record;
pub mod registry;
pub mod traits;

pub use artifacts::{
    ArtifactStore, ArtifactTarget, CodeSubmission, FinalizeArtifact, FinalizedArtifact,
    WriteArtifact, extract_last_code_block, finalize_artifact,
};
pub use candidates::{ManifestScanner, StaticExtract};
pub use collaborators::{
    AcceptanceFlow, AcceptanceRequest, CaptureNetwork, HumanAcceptance, NetworkCapture,
    UnconfiguredAcceptance, UnconfiguredCapture,
};
pub use context::{CapabilityContext, Collaborators, Prefer, RunMemory, TaskInput};
pub use context_tools::{CropHistory, EstimateTokens, MeasureLog, ReadMessages};
pub use debug::ReadDebugRecent;
pub use diagnose::{DetectInputLimit, DiagnoseError, ErrorClass, ProposedFix, diagnose};
pub use page::{FetchPage, FetchedPage, PageFetcher};
pub use preprocess::{HtmlPreprocessor, PreprocessHtml, Preprocessed};
pub use record::{Finalize, RecordMessage};
pub use registry::CapabilityRegistry;
pub use traits::{ActionKind, Capability, CapabilityOutcome};
