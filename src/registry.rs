//! Job registry (spec §4.B): per-source-code templates that produce
//! canonical job configs, and `create_job_for_source`.
//!
//! Grounded on the teacher's settings-construction style: a typed
//! struct built from defaults and overrides, validated once at
//! construction rather than read as a dynamic dict (REDESIGN FLAG,
//! spec §9).

use std::path::PathBuf;

use chrono::Utc;

use crate::error::{HaError, HaResult};
use crate::models::{ArchiveJob, JobConfig, JobStatus, Source, ToolOptions};
use crate::repository::DbContext;

/// A per-source template: default seeds, passthrough args, and
/// `tool_options`, plus the `name_template` the crawler and filesystem
/// naming use (spec §4.B).
#[derive(Debug, Clone)]
pub struct SourceTemplate {
    pub code: String,
    pub name: String,
    pub base_url: String,
    /// `{yyyymmdd}` is substituted with the job's creation date in UTC.
    pub name_template: String,
    pub default_seeds: Vec<String>,
    pub default_passthrough_args: Vec<String>,
    pub default_tool_options: ToolOptions,
}

impl SourceTemplate {
    fn render_name(&self, at: chrono::DateTime<Utc>) -> String {
        self.name_template.replace("{yyyymmdd}", &at.format("%Y%m%d").to_string())
    }
}

/// Overrides a caller may supply over a template's defaults when
/// creating a job (spec §4.B `create_job_for_source`).
#[derive(Debug, Clone, Default)]
pub struct JobOverrides {
    pub seeds: Option<Vec<String>>,
    pub tool_options: Option<ToolOptions>,
    pub passthrough_args: Option<Vec<String>>,
}

/// Fixed set of recognized source templates. Real deployments seed this
/// from the `sources` table plus a small static map of crawl defaults
/// per code; kept as an in-process registry here since the template
/// shape (seeds, tool_options, passthrough args) is operational
/// configuration, not request-time data (spec §4.B).
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    templates: Vec<SourceTemplate>,
}

impl JobRegistry {
    pub fn new() -> Self {
        JobRegistry { templates: Vec::new() }
    }

    pub fn register(&mut self, template: SourceTemplate) -> &mut Self {
        self.templates.push(template);
        self
    }

    pub fn template_for_code(&self, code: &str) -> Option<&SourceTemplate> {
        self.templates.iter().find(|t| t.code == code)
    }

    /// Ensures the `Source` row exists, computes `job_name` and
    /// `output_dir = <archive_root>/<code>/<YYYYMMDDThhmmssZ>__<job_name>`,
    /// and inserts an `ArchiveJob(status=queued)` (spec §4.B).
    pub async fn create_job_for_source(
        &self,
        ctx: &DbContext,
        code: &str,
        overrides: JobOverrides,
    ) -> HaResult<ArchiveJob> {
        let template = self
            .template_for_code(code)
            .ok_or_else(|| HaError::Validation(format!("unrecognized source code: {code}")))?;

        let source = match ctx.sources().get_by_code(code).await? {
            Some(s) => s,
            None => {
                let s = Source::new(&template.code, &template.name, &template.base_url);
                ctx.sources().save(&s).await?;
                s
            }
        };

        let now = Utc::now();
        let job_name = template.render_name(now);
        let output_dir = archive_output_dir(ctx.archive_root(), code, &job_name, now);

        let seeds = overrides.seeds.unwrap_or_else(|| template.default_seeds.clone());
        if seeds.is_empty() {
            return Err(HaError::Validation("job config must have at least one seed".to_string()));
        }

        let tool_options = overrides.tool_options.unwrap_or_else(|| template.default_tool_options.clone());
        tool_options.validate()?;

        let passthrough_args = overrides.passthrough_args.unwrap_or_else(|| template.default_passthrough_args.clone());

        let config = JobConfig { seeds, tool_options, passthrough_args };
        let job = ArchiveJob::new(&source.id, &job_name, output_dir.display().to_string(), config);
        debug_assert_eq!(job.status, JobStatus::Queued);

        ctx.jobs().insert(&job).await?;
        Ok(job)
    }
}

fn archive_output_dir(archive_root: &std::path::Path, code: &str, job_name: &str, at: chrono::DateTime<Utc>) -> PathBuf {
    let stamp = at.format("%Y%m%dT%H%M%SZ").to_string();
    archive_root.join(code).join(format!("{stamp}__{job_name}"))
}

/// Built-in templates for the sources named in spec §2's worked
/// example (`hc` — Health Canada) plus a generic template shape other
/// deployments extend. Real source lists are operational data; this
/// function exists so the CLI and tests have a concrete registry to
/// build on without duplicating the defaults in every call site.
pub fn default_registry() -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry.register(SourceTemplate {
        code: "hc".to_string(),
        name: "Health Canada".to_string(),
        base_url: "https://www.canada.ca/en/health-canada.html".to_string(),
        name_template: "hc-{yyyymmdd}".to_string(),
        default_seeds: vec!["https://www.canada.ca/en/health-canada.html".to_string()],
        default_passthrough_args: Vec::new(),
        default_tool_options: ToolOptions::default(),
    });
    registry.register(SourceTemplate {
        code: "phac".to_string(),
        name: "Public Health Agency of Canada".to_string(),
        base_url: "https://www.canada.ca/en/public-health.html".to_string(),
        name_template: "phac-{yyyymmdd}".to_string(),
        default_seeds: vec!["https://www.canada.ca/en/public-health.html".to_string()],
        default_passthrough_args: Vec::new(),
        default_tool_options: ToolOptions::default(),
    });
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ctx(dir: &std::path::Path) -> DbContext {
        let db_path = dir.join("test.db");
        DbContext::new(crate::repository::DbPool::sqlite_from_path(&db_path), dir.to_path_buf())
    }

    #[tokio::test]
    async fn create_job_for_unrecognized_code_fails_fast() {
        let dir = tempdir().unwrap();
        let ctx = ctx(dir.path());
        ctx.init_schema().await.unwrap();
        let registry = default_registry();

        let err = registry.create_job_for_source(&ctx, "unknown", JobOverrides::default()).await.unwrap_err();
        assert!(matches!(err, HaError::Validation(_)));
    }

    #[tokio::test]
    async fn create_job_for_source_inserts_queued_job_and_source() {
        let dir = tempdir().unwrap();
        let ctx = ctx(dir.path());
        ctx.init_schema().await.unwrap();
        let registry = default_registry();

        let job = registry.create_job_for_source(&ctx, "hc", JobOverrides::default()).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.name.starts_with("hc-"));
        assert!(job.output_dir.contains("/hc/"));
        assert_eq!(job.config.seeds.len(), 1);

        let source = ctx.sources().get_by_code("hc").await.unwrap().unwrap();
        assert_eq!(source.code, "hc");
    }

    #[tokio::test]
    async fn overrides_replace_template_defaults() {
        let dir = tempdir().unwrap();
        let ctx = ctx(dir.path());
        ctx.init_schema().await.unwrap();
        let registry = default_registry();

        let overrides = JobOverrides {
            seeds: Some(vec!["https://www.canada.ca/en/custom-page.html".to_string()]),
            ..Default::default()
        };
        let job = registry.create_job_for_source(&ctx, "hc", overrides).await.unwrap();
        assert_eq!(job.config.seeds, vec!["https://www.canada.ca/en/custom-page.html".to_string()]);
    }

    #[tokio::test]
    async fn empty_seeds_override_fails_validation() {
        let dir = tempdir().unwrap();
        let ctx = ctx(dir.path());
        ctx.init_schema().await.unwrap();
        let registry = default_registry();

        let overrides = JobOverrides { seeds: Some(vec![]), ..Default::default() };
        let err = registry.create_job_for_source(&ctx, "hc", overrides).await.unwrap_err();
        assert!(matches!(err, HaError::Validation(_)));
    }
}
