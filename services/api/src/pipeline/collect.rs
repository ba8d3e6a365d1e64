use blog_pipeline_core::{
    domain::{AuthUser, Resource, SourceType},
    sanitize::{sanitize_external, sanitize_user},
    stage::PipelineStep,
    url_guard,
};
use chrono::Utc;
use scraper::{Html, Node, Selector};
use tracing::info;
use uuid::Uuid;

use super::Pipeline;
use crate::error::PipelineError;

/// Maximum characters of extracted text kept per resource.
pub const CONTENT_CEILING: usize = 10_000;
const FILE_NAME_MAX: usize = 200;

/// Elements whose text never belongs to the readable body.
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "header", "footer",
];

/// Readable text recovered from an HTML page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub title: Option<String>,
    pub text: String,
}

/// Extracts the `<title>` and the visible text of an HTML document, with whitespace
/// collapsed to single spaces.
pub fn extract_page(html: &str) -> PageText {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|title| !title.is_empty());

    let mut raw = String::new();
    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let skipped = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| SKIPPED_ELEMENTS.contains(&element.name()))
        });
        if !skipped {
            raw.push_str(text);
            raw.push(' ');
        }
    }

    PageText {
        title,
        text: collapse_whitespace(&raw),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Pipeline {
    /// Fetches a URL and stores its readable text as a resource of the session.
    pub async fn collect_url(
        &self,
        user: AuthUser,
        session_id: Uuid,
        raw_url: &str,
    ) -> Result<Resource, PipelineError> {
        if raw_url.trim().is_empty() {
            return Err(PipelineError::validation("session_id and url are required"));
        }
        // The URL is judged before anything else touches the network or the store.
        let url = url_guard::validate(raw_url)?;

        let session = self.load_or_create_session(user, session_id).await?;
        PipelineStep::CollectResource.check(session.stage)?;

        info!(%session_id, %url, "Collecting resource");
        let page = self
            .fetcher
            .fetch(&url)
            .await
            .map_err(|e| PipelineError::Provider(e.to_string()))?;
        if !(200..300).contains(&page.status) {
            return Err(PipelineError::Provider(format!(
                "Failed to fetch URL: {}",
                page.status
            )));
        }

        let extracted = extract_page(&page.body);
        let title = extracted
            .title
            .or_else(|| page.final_url.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());

        let resource = Resource {
            id: Uuid::new_v4(),
            session_id,
            source_type: SourceType::Url,
            source_url: Some(url.to_string()),
            file_name: None,
            title: Some(sanitize_user(&title, FILE_NAME_MAX)),
            content: sanitize_external(&extracted.text, CONTENT_CEILING),
            collected_at: Utc::now(),
        };
        let saved = self.store.insert_resource(resource).await?;
        info!(%session_id, resource_id = %saved.id, content_length = saved.content.chars().count(), "Resource collected");
        Ok(saved)
    }

    /// Stores uploaded text as a `file` resource of the session.
    pub async fn collect_file(
        &self,
        user: AuthUser,
        session_id: Uuid,
        file_name: &str,
        content: &str,
    ) -> Result<Resource, PipelineError> {
        let file_name = sanitize_user(file_name.trim(), FILE_NAME_MAX);
        if file_name.is_empty() || content.trim().is_empty() {
            return Err(PipelineError::validation(
                "session_id, file_name and content are required",
            ));
        }

        let session = self.load_or_create_session(user, session_id).await?;
        PipelineStep::CollectResource.check(session.stage)?;

        let resource = Resource {
            id: Uuid::new_v4(),
            session_id,
            source_type: SourceType::File,
            source_url: None,
            title: Some(file_name.clone()),
            file_name: Some(file_name),
            content: sanitize_external(content, CONTENT_CEILING),
            collected_at: Utc::now(),
        };
        let saved = self.store.insert_resource(resource).await?;
        info!(%session_id, resource_id = %saved.id, "File resource stored");
        Ok(saved)
    }
}
