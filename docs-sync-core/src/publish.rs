//! Publishing: sync the staged pages into one version of the docs host.
//!
//! Each staged file is a markdown page with optional YAML front matter (the
//! format the per-integration docs generators emit). Pages are addressed by
//! slug; a page whose stored hash equals the local content hash is left
//! alone, so re-publishing an unchanged tree makes no writes.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

use crate::contract::{DocPage, DocsHost};
use crate::error::PublishError;
use crate::stage::StagingArea;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrontMatter {
    title: Option<String>,
    slug: Option<String>,
    category: Option<String>,
    category_slug: Option<String>,
    parent_doc: Option<String>,
    excerpt: Option<String>,
    #[serde(default)]
    hidden: bool,
    order: Option<i64>,
}

/// Split `raw` into its front matter block (if any) and body.
fn split_front_matter(raw: &str) -> (Option<&str>, &str) {
    let rest = match raw
        .strip_prefix("---\n")
        .or_else(|| raw.strip_prefix("---\r\n"))
    {
        Some(rest) => rest,
        None => return (None, raw),
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(yaml), body);
        }
        offset += line.len();
    }
    (None, raw)
}

pub fn content_hash(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    format!("{:x}", hasher.finalize())
}

/// Parse a staged page. The slug defaults to the file stem and the title to
/// the slug.
pub fn parse_doc(file_name: &str, raw: &str) -> Result<DocPage, PublishError> {
    let (yaml, body) = split_front_matter(raw);
    let front: FrontMatter = match yaml {
        Some(yaml) if !yaml.trim().is_empty() => {
            serde_yaml::from_str(yaml).map_err(|e| PublishError::InvalidDocument {
                file: file_name.to_string(),
                reason: format!("bad front matter: {e}"),
            })?
        }
        _ => FrontMatter::default(),
    };

    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let slug = front
        .slug
        .as_deref()
        .map(|s| s.trim().trim_start_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or(stem);
    if slug.is_empty() {
        return Err(PublishError::InvalidDocument {
            file: file_name.to_string(),
            reason: "cannot derive a slug".to_string(),
        });
    }
    let title = front.title.filter(|t| !t.trim().is_empty()).unwrap_or_else(|| slug.clone());

    Ok(DocPage {
        slug,
        title,
        body: body.trim_start_matches(['\n', '\r']).to_string(),
        category: front.category,
        category_slug: front.category_slug,
        parent_doc: front.parent_doc,
        excerpt: front.excerpt,
        hidden: front.hidden,
        order: front.order,
        content_hash: content_hash(raw.as_bytes()),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishAction {
    Created,
    Updated,
    /// Remote hash equals the local one.
    Unchanged,
    /// Dry run.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishRecord {
    pub file_name: String,
    pub slug: String,
    pub action: PublishAction,
}

/// Push every staged page to `host` under `version`.
///
/// An empty staging area makes no host calls. The first host error aborts
/// the publish; pages already written stay written.
pub async fn publish_staging<H>(
    host: &H,
    staging: &StagingArea,
    version: &str,
    dry_run: bool,
) -> Result<Vec<PublishRecord>, PublishError>
where
    H: DocsHost + ?Sized,
{
    if staging.is_empty() {
        info!("[PUBLISH] Staging area is empty, nothing to publish");
        return Ok(Vec::new());
    }

    let mut artifacts: Vec<_> = staging.artifacts().iter().collect();
    artifacts.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    let mut records = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let raw = tokio::fs::read_to_string(&artifact.staged_path)
            .await
            .map_err(|source| PublishError::Io {
                path: artifact.staged_path.clone(),
                source,
            })?;
        let doc = parse_doc(&artifact.file_name, &raw)?;
        debug!(file = %artifact.file_name, slug = %doc.slug, hash = %doc.content_hash, "Parsed staged page");

        let action = if dry_run {
            info!(file = %artifact.file_name, slug = %doc.slug, version, "[PUBLISH][DRY-RUN] Would publish page");
            PublishAction::Skipped
        } else {
            publish_one(host, &doc, version).await.map_err(|e| {
                error!(file = %artifact.file_name, slug = %doc.slug, error = %e, "[PUBLISH][ERROR] Publishing page failed");
                e
            })?
        };

        records.push(PublishRecord {
            file_name: artifact.file_name.clone(),
            slug: doc.slug,
            action,
        });
    }

    info!(pages = records.len(), version, dry_run, "[PUBLISH] Publish complete");
    Ok(records)
}

async fn publish_one<H>(host: &H, doc: &DocPage, version: &str) -> Result<PublishAction, PublishError>
where
    H: DocsHost + ?Sized,
{
    match host.get_doc(&doc.slug, version).await? {
        None => {
            host.create_doc(doc, version).await?;
            info!(slug = %doc.slug, version, "[PUBLISH] Created page");
            Ok(PublishAction::Created)
        }
        Some(remote) if remote.last_updated_hash.as_deref() == Some(doc.content_hash.as_str()) => {
            info!(slug = %doc.slug, version, "[PUBLISH] Page unchanged");
            Ok(PublishAction::Unchanged)
        }
        Some(_) => {
            host.update_doc(&doc.slug, doc, version).await?;
            info!(slug = %doc.slug, version, "[PUBLISH] Updated page");
            Ok(PublishAction::Updated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockDocsHost, RemoteDoc};
    use crate::stage::ArtifactPattern;
    use std::fs;
    use tempfile::tempdir;

    const PAGE: &str = "---\ntitle: Amazon Bedrock\nexcerpt: Amazon Bedrock integration for Haystack\ncategory: 6249a41de5d2d5001a4b8cde\nslug: /integrations-amazon-bedrock\norder: 9\nhidden: false\n---\n\n# Module converse\n";

    #[test]
    fn parses_front_matter_and_body() {
        let doc = parse_doc("_readme_amazon_bedrock.md", PAGE).unwrap();
        assert_eq!(doc.slug, "integrations-amazon-bedrock");
        assert_eq!(doc.title, "Amazon Bedrock");
        assert_eq!(doc.category.as_deref(), Some("6249a41de5d2d5001a4b8cde"));
        assert_eq!(doc.order, Some(9));
        assert!(!doc.hidden);
        assert_eq!(doc.body, "# Module converse\n");
        assert_eq!(doc.content_hash.len(), 64);
    }

    #[test]
    fn page_without_front_matter_uses_file_stem() {
        let doc = parse_doc("_readme_qdrant.md", "# Qdrant\n").unwrap();
        assert_eq!(doc.slug, "_readme_qdrant");
        assert_eq!(doc.title, "_readme_qdrant");
        assert_eq!(doc.body, "# Qdrant\n");
    }

    #[test]
    fn unterminated_front_matter_is_body() {
        let doc = parse_doc("_readme_x.md", "---\ntitle: X\n").unwrap();
        assert_eq!(doc.title, "_readme_x");
        assert_eq!(doc.body, "---\ntitle: X\n");
    }

    #[test]
    fn malformed_front_matter_is_rejected() {
        let err = parse_doc("_readme_x.md", "---\ntitle: [unclosed\n---\nbody").unwrap_err();
        assert!(matches!(err, PublishError::InvalidDocument { .. }));
    }

    fn staged(pages: &[(&str, &str)]) -> (tempfile::TempDir, StagingArea) {
        let root = tempdir().unwrap();
        for (name, content) in pages {
            let path = root.path().join("foo").join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        fs::create_dir_all(root.path().join("foo")).unwrap();
        let mut staging = StagingArea::new().unwrap();
        let pattern = ArtifactPattern::new(crate::config::DEFAULT_ARTIFACT_PATTERN).unwrap();
        staging.collect(root.path(), ["foo"], &pattern).unwrap();
        (root, staging)
    }

    fn remote(slug: &str, hash: Option<String>) -> RemoteDoc {
        RemoteDoc {
            slug: slug.to_string(),
            title: slug.to_string(),
            last_updated_hash: hash,
        }
    }

    #[tokio::test]
    async fn empty_staging_makes_no_host_calls() {
        let (_root, staging) = staged(&[]);
        let host = MockDocsHost::new();
        let records = publish_staging(&host, &staging, "2.0", false).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn creates_missing_and_updates_changed_pages() {
        let (_root, staging) = staged(&[
            ("_readme_a.md", "---\nslug: a\n---\nA\n"),
            ("_readme_b.md", "---\nslug: b\n---\nB\n"),
        ]);

        let mut host = MockDocsHost::new();
        host.expect_get_doc()
            .withf(|slug, version| slug == "a" && version == "2.0")
            .times(1)
            .returning(|_, _| Ok(None));
        host.expect_get_doc()
            .withf(|slug, _| slug == "b")
            .times(1)
            .returning(|slug, _| Ok(Some(remote(slug, Some("stale".into())))));
        host.expect_create_doc()
            .withf(|doc, _| doc.slug == "a")
            .times(1)
            .returning(|doc, _| Ok(remote(&doc.slug, Some(doc.content_hash.clone()))));
        host.expect_update_doc()
            .withf(|slug, doc, _| slug == "b" && doc.body == "B\n")
            .times(1)
            .returning(|slug, doc, _| Ok(remote(slug, Some(doc.content_hash.clone()))));

        let records = publish_staging(&host, &staging, "2.0", false).await.unwrap();
        let actions: Vec<_> = records.iter().map(|r| (r.slug.as_str(), r.action)).collect();
        assert_eq!(
            actions,
            vec![("a", PublishAction::Created), ("b", PublishAction::Updated)]
        );
    }

    #[tokio::test]
    async fn unchanged_pages_are_not_rewritten() {
        let raw = "---\nslug: a\n---\nA\n";
        let (_root, staging) = staged(&[("_readme_a.md", raw)]);
        let hash = content_hash(raw.as_bytes());

        let mut host = MockDocsHost::new();
        host.expect_get_doc()
            .times(1)
            .returning(move |slug, _| Ok(Some(remote(slug, Some(hash.clone())))));
        host.expect_update_doc().times(0);
        host.expect_create_doc().times(0);

        let records = publish_staging(&host, &staging, "2.0", false).await.unwrap();
        assert_eq!(records[0].action, PublishAction::Unchanged);
    }

    #[tokio::test]
    async fn dry_run_never_calls_the_host() {
        let (_root, staging) = staged(&[("_readme_a.md", "A\n")]);
        let host = MockDocsHost::new();
        let records = publish_staging(&host, &staging, "2.0", true).await.unwrap();
        assert_eq!(records[0].action, PublishAction::Skipped);
    }

    #[tokio::test]
    async fn host_errors_abort_the_publish() {
        let (_root, staging) = staged(&[("_readme_a.md", "A\n"), ("_readme_b.md", "B\n")]);

        let mut host = MockDocsHost::new();
        host.expect_get_doc()
            .times(1)
            .returning(|_, _| Err(PublishError::Unauthorized { status: 401 }));

        let err = publish_staging(&host, &staging, "2.0", false).await.unwrap_err();
        assert!(matches!(err, PublishError::Unauthorized { status: 401 }));
    }
}
