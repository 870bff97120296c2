//! Object storage (S3) tools.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::clients::ObjectStorage;
use crate::config::FileRule;
use crate::state::{CoreState, FileMeta};
use crate::tools::factory::BuildContext;
use crate::tools::{parse_args, to_output, Tool, ToolDefinition, ToolError};

/// Text responses are cut here to keep the model context small.
const MAX_TEXT_BYTES: usize = 20_000;
const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
const UNMATCHED_TAG: &str = "other";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp"];
const BINARY_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "pdf", "zip", "mp4", "mov", "psd", "ai",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageTool {
    List,
    Read,
    ReadImage,
    PlmData,
    Download,
    ClassifyAndDownload,
}

pub fn build(
    kind: StorageTool,
    storage: Arc<dyn ObjectStorage>,
    ctx: &BuildContext<'_>,
) -> Arc<dyn Tool> {
    match kind {
        StorageTool::List => Arc::new(ListFiles {
            description: ctx.description("Lists files in object storage under a prefix, e.g. an article folder '12345/'."),
            storage,
        }),
        StorageTool::Read => Arc::new(ReadObject {
            description: ctx.description("Reads a text file (JSON, TXT, MD) from object storage. Not for images."),
            storage,
        }),
        StorageTool::ReadImage => Arc::new(ReadImage {
            description: ctx.description("Downloads an image from object storage and returns it as a base64 data URL for vision analysis."),
            storage,
        }),
        StorageTool::PlmData => Arc::new(PlmData {
            description: ctx.description("Reads the PLM JSON documents of an article from object storage."),
            storage,
        }),
        StorageTool::Download => Arc::new(Download {
            description: ctx.description("Downloads a file, or a folder when the key ends with '/', from object storage to the local download directory."),
            target_dir: if ctx.tool.path.is_empty() {
                PathBuf::from(DEFAULT_DOWNLOAD_DIR)
            } else {
                PathBuf::from(&ctx.tool.path)
            },
            storage,
        }),
        StorageTool::ClassifyAndDownload => Arc::new(ClassifyFiles {
            description: ctx.description("Lists an article's files and classifies them by tag (sketch, plm_data, marketing). Stores metadata only; use read_s3_image or read_s3_object for content."),
            rules: ctx.config.file_rules.clone(),
            storage,
            state: Arc::downgrade(ctx.state),
        }),
    }
}

#[derive(Deserialize)]
struct KeyArgs {
    #[serde(default)]
    key: String,
}

fn key_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {"key": {"type": "string", "description": description}},
        "required": ["key"]
    })
}

fn article_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "article_id": {"type": "string", "description": "Article ID, e.g. '12345'"}
        },
        "required": ["article_id"]
    })
}

fn extension(key: &str) -> String {
    Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase()
}

fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

fn human_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < 5 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let unit = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {unit}B", bytes as f64 / div as f64)
}

fn require_key(key: &str) -> Result<&str, ToolError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(ToolError::InvalidArguments("key is required".into()));
    }
    Ok(key)
}

// ---------------------------------------------------------------------------
// list / read
// ---------------------------------------------------------------------------

struct ListFiles {
    description: String,
    storage: Arc<dyn ObjectStorage>,
}

#[async_trait]
impl Tool for ListFiles {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "list_s3_files",
            &self.description,
            json!({
                "type": "object",
                "properties": {
                    "prefix": {"type": "string", "description": "Folder path, e.g. '12345/', empty for the root"}
                },
                "required": []
            }),
        )
    }

    async fn execute(&self, args_json: &str) -> Result<String, ToolError> {
        #[derive(Deserialize)]
        struct Args {
            #[serde(default)]
            prefix: String,
        }
        let args: Args = parse_args(args_json)?;
        let objects = self.storage.list(&args.prefix).await?;
        let listing: Vec<Value> = objects
            .iter()
            .map(|o| json!({"key": o.key, "size": human_size(o.size)}))
            .collect();
        to_output(&listing)
    }
}

struct ReadObject {
    description: String,
    storage: Arc<dyn ObjectStorage>,
}

#[async_trait]
impl Tool for ReadObject {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "read_s3_object",
            &self.description,
            key_schema("Full object key from list_s3_files"),
        )
    }

    async fn execute(&self, args_json: &str) -> Result<String, ToolError> {
        let args: KeyArgs = parse_args(args_json)?;
        let key = require_key(&args.key)?;
        let ext = extension(key);
        if BINARY_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ToolError::InvalidArguments(format!(
                "file type '.{ext}' is binary; use read_s3_image for images"
            )));
        }
        let bytes = self.storage.get_object(key).await?;
        Ok(truncate_text(&bytes))
    }
}

fn truncate_text(bytes: &[u8]) -> String {
    if bytes.len() <= MAX_TEXT_BYTES {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let mut text = String::from_utf8_lossy(&bytes[..MAX_TEXT_BYTES]).into_owned();
    // A cut multi-byte character decodes as U+FFFD at the end.
    text.truncate(text.trim_end_matches('\u{FFFD}').len());
    text.push_str("\n...[TRUNCATED]");
    text
}

// ---------------------------------------------------------------------------
// images
// ---------------------------------------------------------------------------

struct ReadImage {
    description: String,
    storage: Arc<dyn ObjectStorage>,
}

fn mime_type(ext: &str) -> Option<&'static str> {
    match ext {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

#[async_trait]
impl Tool for ReadImage {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "read_s3_image",
            &self.description,
            key_schema("Image object key (jpg, png, webp)"),
        )
    }

    async fn execute(&self, args_json: &str) -> Result<String, ToolError> {
        let args: KeyArgs = parse_args(args_json)?;
        let key = require_key(&args.key)?;
        let mime = mime_type(&extension(key)).ok_or_else(|| {
            ToolError::InvalidArguments(format!("'{key}' is not a supported image"))
        })?;
        let bytes = self.storage.get_object(key).await?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ToolError::Failed(format!(
                "image is too large ({}), limit is {}",
                human_size(bytes.len() as u64),
                human_size(MAX_IMAGE_BYTES as u64)
            )));
        }
        Ok(format!("data:{mime};base64,{}", BASE64.encode(&bytes)))
    }
}

// ---------------------------------------------------------------------------
// PLM data
// ---------------------------------------------------------------------------

struct PlmData {
    description: String,
    storage: Arc<dyn ObjectStorage>,
}

#[derive(Deserialize)]
struct ArticleArgs {
    #[serde(default)]
    article_id: String,
}

impl ArticleArgs {
    fn prefix(&self) -> Result<String, ToolError> {
        let id = self.article_id.trim().trim_matches('/');
        if id.is_empty() {
            return Err(ToolError::InvalidArguments("article_id is required".into()));
        }
        Ok(format!("{id}/"))
    }
}

#[async_trait]
impl Tool for PlmData {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("get_plm_data", &self.description, article_schema())
    }

    async fn execute(&self, args_json: &str) -> Result<String, ToolError> {
        let args: ArticleArgs = parse_args(args_json)?;
        let prefix = args.prefix()?;
        let objects = self.storage.list(&prefix).await?;

        let mut documents = Map::new();
        for obj in objects.iter().filter(|o| extension(&o.key) == "json") {
            let bytes = self.storage.get_object(&obj.key).await?;
            let doc = serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                log::warn!("plm document is not valid json key={} error={e}", obj.key);
                Value::String(truncate_text(&bytes))
            });
            documents.insert(obj.key.clone(), doc);
        }

        if documents.is_empty() {
            return to_output(&json!({
                "article_id": args.article_id,
                "status": "not_found",
                "message": format!("no PLM JSON files under '{prefix}'"),
            }));
        }
        to_output(&json!({
            "article_id": args.article_id,
            "status": "success",
            "documents": documents,
        }))
    }
}

// ---------------------------------------------------------------------------
// download
// ---------------------------------------------------------------------------

struct Download {
    description: String,
    target_dir: PathBuf,
    storage: Arc<dyn ObjectStorage>,
}

#[derive(Debug, Serialize)]
struct DownloadReport {
    success: bool,
    #[serde(rename = "type")]
    kind: &'static str,
    source_path: String,
    dest_path: String,
    files_count: usize,
    total_size: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    files: Vec<String>,
}

impl Download {
    async fn fetch(&self, key: &str, dir: &Path) -> Result<(PathBuf, u64), ToolError> {
        let bytes = self.storage.get_object(key).await?;
        let path = dir.join(file_name(key));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| ToolError::Failed(format!("failed to write {}: {e}", path.display())))?;
        Ok((path, bytes.len() as u64))
    }
}

fn is_safe_key(key: &str) -> bool {
    !key.starts_with('/')
        && Path::new(key)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

#[async_trait]
impl Tool for Download {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "download_s3_files",
            &self.description,
            key_schema("File key, or folder prefix ending with '/', e.g. '12345/plm.json' or '12345/'"),
        )
    }

    async fn execute(&self, args_json: &str) -> Result<String, ToolError> {
        let args: KeyArgs = parse_args(args_json)?;
        let key = require_key(&args.key)?;
        if !is_safe_key(key) {
            return Err(ToolError::InvalidArguments(format!("unsafe key '{key}'")));
        }

        let mkdir = |dir: PathBuf| async move {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| ToolError::Failed(format!("failed to create {}: {e}", dir.display())))
                .map(|_| dir)
        };

        let report = if let Some(folder) = key.strip_suffix('/') {
            let dir = mkdir(self.target_dir.join(folder)).await?;
            let mut files = Vec::new();
            let mut total = 0;
            for obj in self.storage.list(key).await? {
                if obj.key.ends_with('/') {
                    continue;
                }
                let (path, size) = self.fetch(&obj.key, &dir).await?;
                total += size;
                files.push(path.display().to_string());
            }
            DownloadReport {
                success: true,
                kind: "folder",
                source_path: key.to_string(),
                dest_path: dir.display().to_string(),
                files_count: files.len(),
                total_size: total,
                files,
            }
        } else {
            let dir = mkdir(self.target_dir.clone()).await?;
            let (path, size) = self.fetch(key, &dir).await?;
            DownloadReport {
                success: true,
                kind: "file",
                source_path: key.to_string(),
                dest_path: path.display().to_string(),
                files_count: 1,
                total_size: size,
                files: Vec::new(),
            }
        };
        log::info!("downloaded source={} files={}", report.source_path, report.files_count);
        to_output(&report)
    }
}

// ---------------------------------------------------------------------------
// classification
// ---------------------------------------------------------------------------

struct ClassifyFiles {
    description: String,
    rules: Vec<FileRule>,
    storage: Arc<dyn ObjectStorage>,
    state: Weak<CoreState>,
}

/// Compile a shell-style glob (`*`, `?`) into a case-insensitive regex.
fn glob_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::from("(?i)^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Group objects by the first rule with a matching pattern; the rest are
/// tagged `other`. Only the file name is matched, not the path.
pub fn classify_files(
    rules: &[FileRule],
    objects: &[crate::clients::StoredObject],
) -> BTreeMap<String, Vec<FileMeta>> {
    let compiled: Vec<(&str, Vec<Regex>)> = rules
        .iter()
        .map(|r| (r.tag.as_str(), r.patterns.iter().filter_map(|p| glob_regex(p)).collect()))
        .collect();

    let mut out: BTreeMap<String, Vec<FileMeta>> = BTreeMap::new();
    for obj in objects.iter().filter(|o| !o.key.ends_with('/')) {
        let filename = file_name(&obj.key);
        let tag = compiled
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(filename)))
            .map(|(tag, _)| *tag)
            .unwrap_or(UNMATCHED_TAG);
        out.entry(tag.to_string()).or_default().push(FileMeta {
            tag: tag.to_string(),
            key: obj.key.clone(),
            size: obj.size,
            filename: filename.to_string(),
            vision_description: String::new(),
        });
    }
    out
}

#[async_trait]
impl Tool for ClassifyFiles {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "classify_and_download_s3_files",
            &self.description,
            article_schema(),
        )
    }

    async fn execute(&self, args_json: &str) -> Result<String, ToolError> {
        let args: ArticleArgs = parse_args(args_json)?;
        let prefix = args.prefix()?;
        let state = self
            .state
            .upgrade()
            .ok_or_else(|| ToolError::Failed("session state is no longer available".into()))?;

        let objects = self.storage.list(&prefix).await?;
        if objects.is_empty() {
            return to_output(&json!({
                "article_id": args.article_id,
                "status": "warning",
                "message": format!("No files found in storage for article {}", args.article_id),
            }));
        }

        let mut files = classify_files(&self.rules, &objects);
        for meta in files.values_mut().flatten() {
            if extension(&meta.filename) == "json" {
                meta.vision_description =
                    format!("JSON available at {} (use read_s3_object to read)", meta.key);
            }
        }

        let missing: Vec<&str> = self
            .rules
            .iter()
            .filter(|r| r.required && !files.contains_key(&r.tag))
            .map(|r| r.tag.as_str())
            .collect();
        let by_tag: BTreeMap<&String, usize> = files.iter().map(|(t, f)| (t, f.len())).collect();
        let images = files
            .values()
            .flatten()
            .filter(|f| IMAGE_EXTENSIONS.contains(&extension(&f.filename).as_str()))
            .count();

        let summary = json!({
            "article_id": args.article_id,
            "status": if missing.is_empty() { "success" } else { "incomplete" },
            "files": by_tag,
            "total_count": objects.len(),
            "images": images,
            "missing_required_tags": missing,
            "next_steps": [
                "Use read_s3_image for vision analysis of specific images",
                "Use read_s3_object to read JSON files with PLM metadata"
            ],
        });
        state.set_files(files);
        to_output(&summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ClientError, StoredObject};
    use crate::config::{AppConfig, ToolConfig};
    use bytes::Bytes;
    use std::collections::HashMap;

    struct FakeBucket {
        objects: HashMap<String, Vec<u8>>,
    }

    impl FakeBucket {
        fn new(entries: &[(&str, &[u8])]) -> Arc<Self> {
            Arc::new(Self {
                objects: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_vec()))
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl ObjectStorage for FakeBucket {
        async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, ClientError> {
            let mut out: Vec<StoredObject> = self
                .objects
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| StoredObject {
                    key: k.clone(),
                    size: v.len() as u64,
                    last_modified: String::new(),
                })
                .collect();
            out.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(out)
        }

        async fn get_object(&self, key: &str) -> Result<Bytes, ClientError> {
            self.objects
                .get(key)
                .map(|v| Bytes::from(v.clone()))
                .ok_or_else(|| ClientError::Status {
                    status: 404,
                    body: key.to_string(),
                })
        }

        fn bucket(&self) -> &str {
            "plm"
        }
    }

    fn build_with(
        kind: StorageTool,
        bucket: Arc<FakeBucket>,
        cfg: AppConfig,
        tool_cfg: ToolConfig,
    ) -> (Arc<dyn Tool>, Arc<CoreState>) {
        let state = Arc::new(CoreState::new(cfg.clone()));
        let ctx = BuildContext {
            name: "storage_tool",
            tool: &tool_cfg,
            config: &cfg,
            state: &state,
        };
        (build(kind, bucket, &ctx), state)
    }

    fn rules() -> Vec<FileRule> {
        vec![
            FileRule {
                tag: "sketch".into(),
                patterns: vec!["*.jpg".into(), "*.png".into()],
                required: true,
            },
            FileRule {
                tag: "plm_data".into(),
                patterns: vec!["*.json".into()],
                required: true,
            },
            FileRule {
                tag: "marketing".into(),
                patterns: vec!["promo_?.txt".into()],
                required: false,
            },
        ]
    }

    #[test]
    fn test_classify_files_first_rule_wins() {
        let objects: Vec<StoredObject> = ["1/front.JPG", "1/plm.json", "1/promo_1.txt", "1/notes.md", "1/"]
            .iter()
            .map(|k| StoredObject {
                key: k.to_string(),
                ..Default::default()
            })
            .collect();
        let files = classify_files(&rules(), &objects);
        assert_eq!(files["sketch"][0].filename, "front.JPG");
        assert_eq!(files["plm_data"][0].key, "1/plm.json");
        assert_eq!(files["marketing"].len(), 1);
        assert_eq!(files["other"][0].filename, "notes.md");
        assert_eq!(files.values().map(Vec::len).sum::<usize>(), 4);
    }

    #[test]
    fn test_human_size_and_truncation() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MB");

        let long = "я".repeat(MAX_TEXT_BYTES);
        let out = truncate_text(long.as_bytes());
        assert!(out.ends_with("...[TRUNCATED]"));
        assert!(!out.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn test_read_object_rejects_binary() {
        let bucket = FakeBucket::new(&[("1/plm.json", b"{\"a\":1}"), ("1/a.jpg", b"\xff")]);
        let (tool, _) = build_with(StorageTool::Read, bucket, AppConfig::default(), ToolConfig::default());
        assert_eq!(tool.execute(r#"{"key": "1/plm.json"}"#).await.unwrap(), "{\"a\":1}");
        assert!(matches!(
            tool.execute(r#"{"key": "1/a.jpg"}"#).await,
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn test_read_image_returns_data_url() {
        let bucket = FakeBucket::new(&[("1/a.png", b"png-bytes")]);
        let (tool, _) = build_with(StorageTool::ReadImage, bucket, AppConfig::default(), ToolConfig::default());
        let out = tool.execute(r#"{"key": "1/a.png"}"#).await.unwrap();
        assert_eq!(out, format!("data:image/png;base64,{}", BASE64.encode(b"png-bytes")));
    }

    #[tokio::test]
    async fn test_plm_data_collects_json_documents() {
        let bucket = FakeBucket::new(&[
            ("12345/plm.json", br#"{"season": "summer"}"#),
            ("12345/front.jpg", b"\xff"),
        ]);
        let (tool, _) = build_with(StorageTool::PlmData, bucket, AppConfig::default(), ToolConfig::default());
        let out: Value = serde_json::from_str(&tool.execute(r#"{"article_id": "12345"}"#).await.unwrap()).unwrap();
        assert_eq!(out["documents"]["12345/plm.json"]["season"], "summer");

        let out: Value = serde_json::from_str(&tool.execute(r#"{"article_id": "999"}"#).await.unwrap()).unwrap();
        assert_eq!(out["status"], "not_found");
    }

    #[tokio::test]
    async fn test_download_folder() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = FakeBucket::new(&[("12345/plm.json", b"{}"), ("12345/a.jpg", b"img")]);
        let (tool, _) = build_with(
            StorageTool::Download,
            bucket,
            AppConfig::default(),
            ToolConfig {
                path: dir.path().display().to_string(),
                ..Default::default()
            },
        );

        let out: Value = serde_json::from_str(&tool.execute(r#"{"key": "12345/"}"#).await.unwrap()).unwrap();
        assert_eq!(out["type"], "folder");
        assert_eq!(out["files_count"], 2);
        assert_eq!(std::fs::read(dir.path().join("12345/a.jpg")).unwrap(), b"img");

        assert!(tool.execute(r#"{"key": "../etc/passwd"}"#).await.is_err());
    }

    #[tokio::test]
    async fn test_classify_stores_files_in_state() {
        let bucket = FakeBucket::new(&[("12345/front.jpg", b"img"), ("12345/plm.json", b"{}")]);
        let cfg = AppConfig {
            file_rules: rules(),
            ..Default::default()
        };
        let (tool, state) = build_with(StorageTool::ClassifyAndDownload, bucket, cfg, ToolConfig::default());

        let out: Value = serde_json::from_str(&tool.execute(r#"{"article_id": "12345"}"#).await.unwrap()).unwrap();
        assert_eq!(out["status"], "success");
        assert_eq!(out["images"], 1);

        let files = state.files();
        assert_eq!(files["sketch"][0].key, "12345/front.jpg");
        assert!(files["plm_data"][0].vision_description.contains("read_s3_object"));
    }
}
