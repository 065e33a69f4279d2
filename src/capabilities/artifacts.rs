use super::context::CapabilityContext;
use super::traits::{ActionKind, Capability, CapabilityOutcome, arg_str};
use crate::audit::{EntryDraft, Flag, agents};
use crate::session::protocol;
use anyhow::{Context, bail};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use strum::{Display, EnumString};

/// Which artifact log a piece of generated code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ArtifactTarget {
    Static,
    Dynamic,
}

impl ArtifactTarget {
    fn header(self) -> &'static str {
        match self {
            Self::Static => "# Static Algorithm Code",
            Self::Dynamic => "# Dynamic Algorithm Code",
        }
    }

    /// Lenient parse of a directive argument.
    pub fn from_arg(value: Option<&Value>) -> Option<Self> {
        value
            .and_then(Value::as_str)
            .and_then(|s| Self::from_str(s.trim()).ok())
    }
}

const CODE_HEADING: &str = "### [code:";
const STORE_EXTENSIONS: [&str; 3] = ["js", "ts", "md"];

/// One submitted code block.
#[derive(Debug, Clone, Default)]
pub struct CodeSubmission {
    pub title: Option<String>,
    pub language: Option<String>,
    pub code: String,
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedArtifact {
    pub target_name: String,
    pub pick: ArtifactTarget,
    pub file_path: PathBuf,
}

/// Append-only artifact logs plus the directory finalized artifacts land in.
pub struct ArtifactStore {
    root: PathBuf,
    store_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ArtifactStore {
    pub fn open(log_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = log_dir.into();
        let store_dir = root.join("algorithms");
        std::fs::create_dir_all(&store_dir)
            .with_context(|| format!("creating {}", store_dir.display()))?;
        Ok(Self {
            root,
            store_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn log_path(&self, target: ArtifactTarget) -> PathBuf {
        self.root.join(format!("algorithm_{target}.md"))
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Append a `### [code:<ts>] title` block to the target's log.
    pub fn append_code(
        &self,
        target: ArtifactTarget,
        submission: &CodeSubmission,
    ) -> anyhow::Result<PathBuf> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.log_path(target);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        if file.metadata().is_ok_and(|m| m.len() == 0) {
            write!(file, "{}\n\n", target.header())?;
        }
        file.write_all(render_code_block(submission).as_bytes())
            .with_context(|| format!("appending to {}", path.display()))?;
        Ok(path)
    }

    /// Body of the newest code block in the target's log.
    pub fn last_code(&self, target: ArtifactTarget) -> Option<String> {
        let content = std::fs::read_to_string(self.log_path(target)).ok()?;
        extract_last_code_block(&content)
    }

    /// Names of stored artifacts, sorted.
    pub fn names(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.store_dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| STORE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            })
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(String::from))
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Copy the newest code block of `pick` into the store as `<name>.js`.
    /// The name is required and must not already exist.
    pub fn finalize(
        &self,
        pick: ArtifactTarget,
        name: Option<&str>,
    ) -> anyhow::Result<FinalizedArtifact> {
        let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
            bail!("artifact name is required to finalize");
        };
        if name.contains(['/', '\\']) || name.starts_with('.') {
            bail!("invalid artifact name: {name}");
        }
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.names().iter().any(|existing| existing == name) {
            bail!("artifact name conflict: {name}");
        }
        let Some(code) = self.last_code(pick) else {
            bail!("no code block in the {pick} artifact log");
        };
        let file_path = self.store_dir.join(format!("{name}.js"));
        std::fs::write(&file_path, code)
            .with_context(|| format!("writing {}", file_path.display()))?;
        Ok(FinalizedArtifact {
            target_name: name.to_string(),
            pick,
            file_path,
        })
    }
}

fn render_code_block(submission: &CodeSubmission) -> String {
    let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let language: String = submission
        .language
        .as_deref()
        .unwrap_or("js")
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let language = if language.is_empty() { "js".to_string() } else { language };
    let mut meta = serde_json::Map::new();
    meta.insert("ts".into(), Value::String(ts.clone()));
    match &submission.meta {
        Some(Value::Object(extra)) => meta.extend(extra.clone()),
        Some(Value::Null) | None => {}
        Some(other) => {
            meta.insert("meta".into(), other.clone());
        }
    }
    let meta = serde_json::to_string_pretty(&Value::Object(meta)).unwrap_or_default();
    let heading = format!(
        "{CODE_HEADING}{ts}] {}",
        submission.title.as_deref().unwrap_or_default()
    );
    format!(
        "{}\n```{language}\n{}\n```\n\n```json\n{meta}\n```\n\n",
        heading.trim_end(),
        submission.code
    )
}

/// Fenced body following the last `### [code:` heading.
pub fn extract_last_code_block(markdown: &str) -> Option<String> {
    let lines: Vec<&str> = markdown.lines().collect();
    let heading = lines.iter().rposition(|line| line.starts_with(CODE_HEADING))?;
    let open = heading
        + 1
        + lines[heading + 1..]
            .iter()
            .position(|line| line.starts_with("```"))?;
    let close = open
        + 1
        + lines[open + 1..]
            .iter()
            .position(|line| line.trim_end() == "```")?;
    Some(lines[open + 1..close].join("\n"))
}

// ── Capabilities ─────────────────────────────────────────────────────────────

/// `code_maintainer_agent_write`: append generated code to an artifact log.
pub struct WriteArtifact {
    fixed_target: Option<ArtifactTarget>,
}

impl WriteArtifact {
    /// Target taken from the `target` argument.
    pub fn any_target() -> Self {
        Self { fixed_target: None }
    }

    /// Target pinned regardless of arguments.
    pub fn pinned(target: ArtifactTarget) -> Self {
        Self {
            fixed_target: Some(target),
        }
    }

    fn write(&self, args: &Value, ctx: &CapabilityContext) -> anyhow::Result<CapabilityOutcome> {
        let Some(target) = self
            .fixed_target
            .or_else(|| ArtifactTarget::from_arg(args.get("target")))
        else {
            return Ok(json!({"ok": false, "error": "target must be static or dynamic"}).into());
        };

        let code = args.get("code").and_then(Value::as_str).unwrap_or_default();
        let min_chars = ctx.config.session.min_artifact_chars;
        if code.trim().chars().count() < min_chars {
            ctx.record(EntryDraft::new(
                ctx.agent.as_str(),
                "error",
                format!("rejected {target} artifact write: code empty or shorter than {min_chars} chars"),
            ))?;
            return Ok(CapabilityOutcome::new(json!({"ok": false, "error": "code_too_short"}))
                .with_follow_up(protocol::artifact_retry(target, min_chars)));
        }

        let submission = CodeSubmission {
            title: arg_str(args, "title").map(String::from),
            language: arg_str(args, "language").map(String::from),
            code: code.to_string(),
            meta: args.get("meta").cloned(),
        };
        let path = ctx.artifacts.append_code(target, &submission)?;
        let title: String = submission.title.as_deref().unwrap_or_default().chars().take(40).collect();
        ctx.record(
            EntryDraft::new(
                agents::CODE_MAINTAINER,
                format!("write_code_{target}"),
                format!("wrote {target} artifact code: {title}"),
            )
            .payload(json!({
                "language": submission.language.as_deref().unwrap_or("js"),
                "path": path.display().to_string(),
            }))
            .flag(Flag::Keep),
        )?;
        Ok(CapabilityOutcome::new(json!({
            "ok": true,
            "target": target,
            "path": path.display().to_string(),
        }))
        .with_action(ActionKind::ArtifactWritten))
    }
}

impl Capability for WriteArtifact {
    fn name(&self) -> &str {
        "code_maintainer_agent_write"
    }

    fn description(&self) -> &str {
        "Append complete generated code to an artifact log. Args: {target?, title?, language?, code, meta?}"
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>> {
        Box::pin(async move { self.write(&args, ctx) })
    }
}

/// Finalize into the artifact store and record the outcome. Failures are
/// reported in the returned value, never raised.
pub fn finalize_artifact(
    ctx: &CapabilityContext,
    pick: ArtifactTarget,
    name: Option<&str>,
) -> anyhow::Result<Value> {
    match ctx.artifacts.finalize(pick, name) {
        Ok(done) => {
            ctx.record(
                EntryDraft::new(
                    agents::CODE_MAINTAINER,
                    "finalize",
                    format!("finalized {pick} artifact as {}", done.target_name),
                )
                .payload(json!({"name": done.target_name, "pick": pick}))
                .flags([Flag::Final, Flag::Critical, Flag::Keep]),
            )?;
            let mut output = serde_json::to_value(&done)?;
            if let Value::Object(map) = &mut output {
                map.insert("ok".into(), Value::Bool(true));
            }
            Ok(output)
        }
        Err(err) => {
            ctx.record(EntryDraft::new(
                agents::CODE_MAINTAINER,
                "error",
                format!("finalize failed: {err}"),
            ))?;
            Ok(json!({"ok": false, "pick": pick, "error": err.to_string()}))
        }
    }
}

/// `code_maintainer_agent_finalize {algo_pick?, targetName?}`.
pub struct FinalizeArtifact;

impl Capability for FinalizeArtifact {
    fn name(&self) -> &str {
        "code_maintainer_agent_finalize"
    }

    fn description(&self) -> &str {
        "Store the newest static or dynamic artifact under a name. Args: {algo_pick?, targetName?}"
    }

    fn execute<'a>(
        &'a self,
        args: Value,
        ctx: &'a CapabilityContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CapabilityOutcome>> + Send + 'a>> {
        Box::pin(async move {
            let pick = ArtifactTarget::from_arg(args.get("algo_pick")).unwrap_or(ArtifactTarget::Static);
            let name = arg_str(&args, "targetName").or(ctx.input.algo_name.as_deref());
            finalize_artifact(ctx, pick, name).map(CapabilityOutcome::new)
        })
    }
}
