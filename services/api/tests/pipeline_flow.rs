//! End-to-end runs of the pipeline over in-memory ports.

use api_lib::{
    config::Config,
    error::PipelineError,
    pipeline::{prompts, OutlineEdit, Pipeline},
    web::{self, AppState},
};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Request, StatusCode},
};
use blog_pipeline_core::{
    domain::{
        AuthUser, Draft, DraftStatus, Insight, InsightStatus, Outline, Research, Resource,
        SectionType, SeoMetrics, Session, Stage,
    },
    gateway::ProviderGateway,
    ports::{
        FetchedPage, Generation, GenerationRequest, GenerationService, PageFetcher, PipelineStore,
        PortError, PortResult, RateLimitStore,
    },
    rate_limit::RateLimiter,
    scoring::MAX_SUGGESTIONS,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use url::Url;
use uuid::Uuid;

//=========================================================================================
// In-memory ports
//=========================================================================================

#[derive(Default)]
struct Tables {
    tokens: HashMap<String, Uuid>,
    sessions: HashMap<Uuid, Session>,
    resources: Vec<Resource>,
    insights: Vec<Insight>,
    research: Vec<Research>,
    outlines: HashMap<Uuid, Outline>,
    drafts: HashMap<Uuid, Draft>,
    counters: HashMap<(Uuid, String, DateTime<Utc>), u32>,
}

#[derive(Default)]
struct MemoryStore {
    tables: Mutex<Tables>,
    /// When set, the next draft read returns the stored row and then moves it to this
    /// status, as a concurrent request would.
    racing_status: Mutex<Option<DraftStatus>>,
    fail_insight_insert: bool,
}

impl MemoryStore {
    fn with_token(token: &str, user_id: Uuid) -> Self {
        let store = Self::default();
        store
            .tables
            .lock()
            .unwrap()
            .tokens
            .insert(token.to_string(), user_id);
        store
    }

    fn stage_of(&self, session_id: Uuid) -> Stage {
        self.tables.lock().unwrap().sessions[&session_id].stage
    }

    fn research_count(&self, session_id: Uuid) -> usize {
        let tables = self.tables.lock().unwrap();
        tables
            .research
            .iter()
            .filter(|r| r.session_id == session_id)
            .count()
    }
}

fn missing(what: &str, id: Uuid) -> PortError {
    PortError::NotFound(format!("{} {} not found", what, id))
}

#[async_trait]
impl PipelineStore for MemoryStore {
    async fn validate_token(&self, token: &str) -> PortResult<AuthUser> {
        let tables = self.tables.lock().unwrap();
        tables
            .tokens
            .get(token)
            .map(|user_id| AuthUser { user_id: *user_id })
            .ok_or_else(|| PortError::Unauthorized("Invalid token".to_string()))
    }

    async fn create_session(&self, session_id: Uuid, user_id: Uuid) -> PortResult<Session> {
        let mut tables = self.tables.lock().unwrap();
        let now = Utc::now();
        let session = tables.sessions.entry(session_id).or_insert(Session {
            id: session_id,
            user_id,
            stage: Stage::Input,
            keywords: None,
            target_audience: None,
            version: 0,
            created_at: now,
            updated_at: now,
        });
        Ok(session.clone())
    }

    async fn get_session(&self, session_id: Uuid) -> PortResult<Session> {
        let tables = self.tables.lock().unwrap();
        tables
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or_else(|| missing("Session", session_id))
    }

    async fn advance_session(
        &self,
        session_id: Uuid,
        expected_version: i64,
        next: Stage,
    ) -> PortResult<Session> {
        let mut tables = self.tables.lock().unwrap();
        let session = tables
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| missing("Session", session_id))?;
        if session.version != expected_version {
            return Err(PortError::Conflict(format!("session {} moved", session_id)));
        }
        session.stage = next;
        session.version += 1;
        session.updated_at = Utc::now();
        Ok(session.clone())
    }

    async fn update_session_context(
        &self,
        session_id: Uuid,
        keywords: Option<&str>,
        target_audience: Option<&str>,
    ) -> PortResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let session = tables
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| missing("Session", session_id))?;
        session.keywords = keywords.map(str::to_string);
        session.target_audience = target_audience.map(str::to_string);
        Ok(())
    }

    async fn insert_resource(&self, resource: Resource) -> PortResult<Resource> {
        self.tables.lock().unwrap().resources.push(resource.clone());
        Ok(resource)
    }

    async fn list_resources(&self, session_id: Uuid) -> PortResult<Vec<Resource>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .resources
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn insert_insights(&self, insights: Vec<Insight>) -> PortResult<Vec<Insight>> {
        if self.fail_insight_insert {
            return Err(PortError::Unexpected("insert failed".to_string()));
        }
        self.tables
            .lock()
            .unwrap()
            .insights
            .extend(insights.iter().cloned());
        Ok(insights)
    }

    async fn get_insight(&self, insight_id: Uuid) -> PortResult<Insight> {
        let tables = self.tables.lock().unwrap();
        tables
            .insights
            .iter()
            .find(|i| i.id == insight_id)
            .cloned()
            .ok_or_else(|| missing("Insight", insight_id))
    }

    async fn replace_selection(&self, session_id: Uuid, insight_ids: &[Uuid]) -> PortResult<()> {
        let mut tables = self.tables.lock().unwrap();
        for insight in tables
            .insights
            .iter_mut()
            .filter(|i| i.session_id == session_id)
        {
            if insight_ids.contains(&insight.id) {
                insight.status = InsightStatus::Selected;
            } else if insight.status == InsightStatus::Selected {
                insight.status = InsightStatus::Pending;
            }
        }
        Ok(())
    }

    async fn insert_research(&self, research: Vec<Research>) -> PortResult<Vec<Research>> {
        self.tables
            .lock()
            .unwrap()
            .research
            .extend(research.iter().cloned());
        Ok(research)
    }

    async fn get_research(&self, research_id: Uuid) -> PortResult<Research> {
        let tables = self.tables.lock().unwrap();
        tables
            .research
            .iter()
            .find(|r| r.id == research_id)
            .cloned()
            .ok_or_else(|| missing("Research", research_id))
    }

    async fn insert_outline(&self, outline: Outline) -> PortResult<Outline> {
        self.tables
            .lock()
            .unwrap()
            .outlines
            .insert(outline.id, outline.clone());
        Ok(outline)
    }

    async fn get_outline(&self, outline_id: Uuid) -> PortResult<Outline> {
        let tables = self.tables.lock().unwrap();
        tables
            .outlines
            .get(&outline_id)
            .cloned()
            .ok_or_else(|| missing("Outline", outline_id))
    }

    async fn update_outline(&self, outline: &Outline) -> PortResult<Outline> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.outlines.contains_key(&outline.id) {
            return Err(missing("Outline", outline.id));
        }
        tables.outlines.insert(outline.id, outline.clone());
        Ok(outline.clone())
    }

    async fn insert_draft(&self, draft: Draft) -> PortResult<Draft> {
        self.tables
            .lock()
            .unwrap()
            .drafts
            .insert(draft.id, draft.clone());
        Ok(draft)
    }

    async fn get_draft(&self, draft_id: Uuid) -> PortResult<Draft> {
        let mut tables = self.tables.lock().unwrap();
        let stored = tables
            .drafts
            .get_mut(&draft_id)
            .ok_or_else(|| missing("Draft", draft_id))?;
        let snapshot = stored.clone();
        if let Some(status) = self.racing_status.lock().unwrap().take() {
            stored.status = status;
        }
        Ok(snapshot)
    }

    async fn save_draft_analysis(
        &self,
        draft_id: Uuid,
        metrics: &SeoMetrics,
        meta_description: &str,
        primary_keywords: Option<&[String]>,
    ) -> PortResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let draft = tables
            .drafts
            .get_mut(&draft_id)
            .ok_or_else(|| missing("Draft", draft_id))?;
        draft.seo_metrics = Some(metrics.clone());
        draft.meta_description = Some(meta_description.to_string());
        if let Some(keywords) = primary_keywords {
            draft.primary_keywords = Some(keywords.to_vec());
        }
        Ok(())
    }

    async fn update_draft_status(
        &self,
        draft_id: Uuid,
        expected: DraftStatus,
        next: DraftStatus,
    ) -> PortResult<Draft> {
        let mut tables = self.tables.lock().unwrap();
        let draft = tables
            .drafts
            .get_mut(&draft_id)
            .ok_or_else(|| missing("Draft", draft_id))?;
        if draft.status != expected {
            return Err(PortError::Conflict(format!("draft {} moved", draft_id)));
        }
        draft.status = next;
        Ok(draft.clone())
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn increment_within(
        &self,
        user_id: Uuid,
        function_name: &str,
        bucket: DateTime<Utc>,
        limit: u32,
    ) -> PortResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let count = tables
            .counters
            .entry((user_id, function_name.to_string(), bucket))
            .or_insert(0);
        if *count >= limit {
            return Ok(false);
        }
        *count += 1;
        Ok(true)
    }
}

/// Answers each request by matching its system prompt to a canned reply.
struct ScriptedProvider {
    insights_reply: String,
}

impl ScriptedProvider {
    fn new() -> Self {
        Self {
            insights_reply: json!({
                "insights": [
                    {"title": "Edge AI moves into stores", "signal": "Chip shipments up",
                     "potential_angle": "Why retailers buy inference hardware",
                     "confidence": "high", "relevance": "high", "tags": ["edge ai", "retail"]},
                    {"title": "Cashierless checkout stalls", "signal": "Pilots paused",
                     "potential_angle": "What went wrong", "confidence": "medium",
                     "relevance": "medium", "tags": ["checkout"]},
                    {"title": "Vision models get cheaper", "signal": "Price cuts",
                     "potential_angle": "Cost curves", "confidence": "low",
                     "relevance": "HIGH", "tags": ["vision"]}
                ]
            })
            .to_string(),
        }
    }

    fn failing_insights() -> Self {
        Self {
            insights_reply: "Sorry, I cannot help with that.".to_string(),
        }
    }
}

fn research_reply() -> String {
    format!(
        "Here is the research:\n```json\n{}\n```",
        json!({
            "topic": "Edge AI in retail",
            "topic_slug": "Edge AI Retail",
            "statistics": [{"stat": "40% of stores pilot edge AI", "source": "Analyst report"}],
            "sources": []
        })
    )
}

fn outline_reply() -> String {
    json!({
        "title": "Edge AI Is Rewiring Retail",
        "target_audience": "Retail CTOs",
        "thesis": "Inference at the shelf beats the cloud round trip",
        "tone": "analytical",
        "structure_pattern": "trend_analysis",
        "sections": [
            {"type": "intro", "title": "Why now", "keywords": ["edge ai"]},
            {"type": "body", "title": "The hardware shift", "keywords": ["edge ai", "retail"]},
            {"type": "body", "title": "Store operations", "keywords": ["retail"]},
            {"type": "conclusion", "title": "What to do next", "keywords": []}
        ]
    })
    .to_string()
}

fn article_reply() -> String {
    let sentence = "Edge AI keeps retail data inside the store and cuts latency for every shelf camera. ";
    let paragraph = sentence.repeat(4);
    let mut article = String::from("```markdown\n# Edge AI Is Rewiring Retail\n\nWhy inference is moving to the shelf.\n\n");
    for heading in ["Why now", "The hardware shift", "Store operations", "Costs", "What to do next"] {
        article.push_str(&format!("## {}\n\n", heading));
        for _ in 0..4 {
            article.push_str(paragraph.trim_end());
            article.push_str("\n\n");
        }
    }
    article.push_str("---\nmeta_description: How edge AI changes retail stores.\nprimary_keywords: [edge ai, retail]\n---\n```");
    article
}

#[async_trait]
impl GenerationService for ScriptedProvider {
    async fn generate(&self, request: GenerationRequest) -> PortResult<Generation> {
        let text = if request.system_prompt == prompts::INSIGHTS_SYSTEM {
            self.insights_reply.clone()
        } else if request.system_prompt == prompts::RESEARCH_SYSTEM {
            research_reply()
        } else if request.system_prompt == prompts::OUTLINE_SYSTEM {
            outline_reply()
        } else if request.system_prompt == prompts::DRAFT_SYSTEM {
            article_reply()
        } else {
            "Edge AI in retail, explained.".to_string()
        };
        Ok(Generation {
            text,
            citations: vec!["https://news.example.com/edge-ai".to_string()],
        })
    }
}

struct StaticPage;

#[async_trait]
impl PageFetcher for StaticPage {
    async fn fetch(&self, url: &Url) -> PortResult<FetchedPage> {
        Ok(FetchedPage {
            final_url: url.clone(),
            status: 200,
            body: "<html><head><title>Edge AI report</title></head><body><p>Retailers deploy vision models in stores.</p></body></html>".to_string(),
        })
    }
}

fn pipeline_over(store: Arc<MemoryStore>, provider: ScriptedProvider) -> Pipeline {
    let provider = Arc::new(provider);
    Pipeline::new(
        store,
        ProviderGateway::new(provider.clone()),
        ProviderGateway::new(provider),
        Arc::new(StaticPage),
    )
}

fn test_config() -> Config {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("DATABASE_URL", "postgres://localhost/pipeline"),
        ("OPENAI_API_KEY", "sk-test"),
        ("SEARCH_API_KEY", "pplx-test"),
    ]);
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

fn app_over(store: Arc<MemoryStore>) -> axum::Router {
    let state = AppState {
        pipeline: pipeline_over(store.clone(), ScriptedProvider::new()),
        limiter: RateLimiter::new(store.clone()),
        store,
        config: Arc::new(test_config()),
    };
    web::router(Arc::new(state))
}

//=========================================================================================
// Tests
//=========================================================================================

#[tokio::test]
async fn full_run_from_resource_to_scored_draft() {
    let store = Arc::new(MemoryStore::default());
    let pipeline = pipeline_over(store.clone(), ScriptedProvider::new());
    let user = AuthUser {
        user_id: Uuid::new_v4(),
    };
    let session_id = Uuid::new_v4();

    let resource = pipeline
        .collect_url(user, session_id, "https://news.example.com/edge-ai")
        .await
        .unwrap();
    assert_eq!(resource.title.as_deref(), Some("Edge AI report"));
    assert_eq!(store.stage_of(session_id), Stage::Input);

    let insights = pipeline
        .extract_insights(user, session_id, Some("edge ai"), Some("Retail CTOs"))
        .await
        .unwrap();
    assert!(insights.len() >= 3);
    assert!(insights.iter().all(|i| i.status == InsightStatus::Pending));
    assert_eq!(store.stage_of(session_id), Stage::Selection);

    let chosen = [insights[0].id, insights[1].id];
    let research = pipeline
        .deep_research(user, session_id, &chosen)
        .await
        .unwrap();
    assert_eq!(research.len(), 2);
    assert_eq!(store.research_count(session_id), 2);
    assert_eq!(research[0].topic_slug, "edge-ai-retail");
    assert_eq!(research[0].sources.len(), 1);
    assert_eq!(store.stage_of(session_id), Stage::Researching);

    let outline = pipeline
        .generate_outline(user, session_id, research[0].id)
        .await
        .unwrap();
    assert_eq!(outline.sections[0].section_type, SectionType::Intro);
    assert_eq!(
        outline.sections.last().map(|s| s.section_type),
        Some(SectionType::Conclusion)
    );
    assert_eq!(store.stage_of(session_id), Stage::Outline);

    let edit = OutlineEdit {
        title: outline.title.clone(),
        target_audience: outline.target_audience.clone(),
        thesis: outline.thesis.clone(),
        tone: outline.tone.clone(),
        structure_pattern: Some(outline.structure_pattern),
        sections: outline.sections.clone(),
    };
    let draft = pipeline
        .write_draft(user, session_id, outline.id, edit)
        .await
        .unwrap();
    assert!((800..=4000).contains(&draft.word_count), "word count {}", draft.word_count);
    assert_eq!(draft.status, DraftStatus::Draft);
    assert_eq!(draft.title, "Edge AI Is Rewiring Retail");
    assert_eq!(
        draft.primary_keywords,
        Some(vec!["edge ai".to_string(), "retail".to_string()])
    );
    assert_eq!(store.stage_of(session_id), Stage::Final);

    let analysis = pipeline.analyze_content(user, draft.id, &[]).await.unwrap();
    assert!(analysis.overall_score <= 100);
    assert!(analysis.suggestions.len() <= MAX_SUGGESTIONS);
    assert_eq!(
        analysis.generated_meta.description,
        "How edge AI changes retail stores."
    );
    assert_eq!(store.stage_of(session_id), Stage::Final);

    let finalized = pipeline
        .update_draft_status(user, draft.id, DraftStatus::Final)
        .await
        .unwrap();
    assert_eq!(finalized.status, DraftStatus::Final);
    let published = pipeline
        .update_draft_status(user, draft.id, DraftStatus::Published)
        .await
        .unwrap();
    assert_eq!(published.status, DraftStatus::Published);
    assert_eq!(store.stage_of(session_id), Stage::Published);
}

#[tokio::test]
async fn outline_before_research_is_a_stage_violation() {
    let store = Arc::new(MemoryStore::default());
    let pipeline = pipeline_over(store.clone(), ScriptedProvider::new());
    let user = AuthUser {
        user_id: Uuid::new_v4(),
    };
    let session_id = Uuid::new_v4();

    pipeline
        .collect_file(user, session_id, "notes.txt", "Retail stores adopt edge AI.")
        .await
        .unwrap();
    pipeline
        .extract_insights(user, session_id, None, None)
        .await
        .unwrap();
    assert_eq!(store.stage_of(session_id), Stage::Selection);

    let err = pipeline
        .generate_outline(user, session_id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Stage(_)), "got {err:?}");
    assert_eq!(store.stage_of(session_id), Stage::Selection);
}

#[tokio::test]
async fn failed_extraction_releases_the_session() {
    let store = Arc::new(MemoryStore::default());
    let pipeline = pipeline_over(store.clone(), ScriptedProvider::failing_insights());
    let user = AuthUser {
        user_id: Uuid::new_v4(),
    };
    let session_id = Uuid::new_v4();

    pipeline
        .collect_file(user, session_id, "notes.txt", "Retail stores adopt edge AI.")
        .await
        .unwrap();
    let err = pipeline
        .extract_insights(user, session_id, None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Parse(_)), "got {err:?}");
    assert_eq!(store.stage_of(session_id), Stage::Input);
    assert!(store.tables.lock().unwrap().insights.is_empty());
}

#[tokio::test]
async fn other_users_sessions_look_missing() {
    let store = Arc::new(MemoryStore::default());
    let pipeline = pipeline_over(store.clone(), ScriptedProvider::new());
    let owner = AuthUser {
        user_id: Uuid::new_v4(),
    };
    let stranger = AuthUser {
        user_id: Uuid::new_v4(),
    };
    let session_id = Uuid::new_v4();

    pipeline
        .collect_file(owner, session_id, "notes.txt", "Retail stores adopt edge AI.")
        .await
        .unwrap();
    let err = pipeline
        .extract_insights(stranger, session_id, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn stage_routes_require_a_bearer_token() {
    let app = app_over(Arc::new(MemoryStore::default()));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/search-news")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"keywords":["edge ai"]}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_is_public() {
    let app = app_over(Arc::new(MemoryStore::default()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn quota_is_enforced_per_operation() {
    let user_id = Uuid::new_v4();
    let store = Arc::new(MemoryStore::with_token("good-token", user_id));
    let app = app_over(store);
    let session_id = Uuid::new_v4();

    let submit = || {
        Request::builder()
            .method("POST")
            .uri("/api/submit-file")
            .header(AUTHORIZATION, "Bearer good-token")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "session_id": session_id,
                    "file_name": "notes.txt",
                    "content": "Retail stores adopt edge AI."
                })
                .to_string(),
            ))
            .unwrap()
    };

    for _ in 0..30 {
        let response = app.clone().oneshot(submit()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.clone().oneshot(submit()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let store = Arc::new(MemoryStore::with_token("good-token", Uuid::new_v4()));
    let app = app_over(store);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/deep-research")
                .header(AUTHORIZATION, "Bearer good-token")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"session_id":"not-a-uuid"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Stores a draft in a `final` session owned by `user`.
fn seed_draft(store: &MemoryStore, user: AuthUser, status: DraftStatus) -> Uuid {
    let now = Utc::now();
    let session_id = Uuid::new_v4();
    let draft_id = Uuid::new_v4();
    let mut tables = store.tables.lock().unwrap();
    tables.sessions.insert(
        session_id,
        Session {
            id: session_id,
            user_id: user.user_id,
            stage: Stage::Final,
            keywords: None,
            target_audience: None,
            version: 4,
            created_at: now,
            updated_at: now,
        },
    );
    tables.drafts.insert(
        draft_id,
        Draft {
            id: draft_id,
            session_id,
            outline_id: None,
            title: "Edge AI Is Rewiring Retail".to_string(),
            subtitle: None,
            content: "# Edge AI Is Rewiring Retail\n\nStores run models locally.".to_string(),
            word_count: 9,
            char_count: 45,
            thumbnail_url: None,
            status,
            seo_metrics: None,
            meta_description: None,
            primary_keywords: None,
            created_at: now,
            updated_at: now,
        },
    );
    draft_id
}

#[tokio::test]
async fn draft_status_never_moves_backwards() {
    let store = Arc::new(MemoryStore::default());
    let pipeline = pipeline_over(store.clone(), ScriptedProvider::new());
    let user = AuthUser {
        user_id: Uuid::new_v4(),
    };
    let draft_id = seed_draft(&store, user, DraftStatus::Published);

    let err = pipeline
        .update_draft_status(user, draft_id, DraftStatus::Final)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Conflict(_)), "got {err:?}");
    assert_eq!(
        store.tables.lock().unwrap().drafts[&draft_id].status,
        DraftStatus::Published
    );
}

#[tokio::test]
async fn stale_status_change_loses_to_a_concurrent_one() {
    let store = Arc::new(MemoryStore::default());
    let pipeline = pipeline_over(store.clone(), ScriptedProvider::new());
    let user = AuthUser {
        user_id: Uuid::new_v4(),
    };
    let draft_id = seed_draft(&store, user, DraftStatus::Draft);
    // Another request finalizes and publishes the draft after this one has read it.
    *store.racing_status.lock().unwrap() = Some(DraftStatus::Published);

    let err = pipeline
        .update_draft_status(user, draft_id, DraftStatus::Final)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Conflict(_)), "got {err:?}");
    assert_eq!(
        store.tables.lock().unwrap().drafts[&draft_id].status,
        DraftStatus::Published
    );
}

#[tokio::test]
async fn failed_insight_insert_leaves_session_context_alone() {
    let store = Arc::new(MemoryStore {
        fail_insight_insert: true,
        ..Default::default()
    });
    let pipeline = pipeline_over(store.clone(), ScriptedProvider::new());
    let user = AuthUser {
        user_id: Uuid::new_v4(),
    };
    let session_id = Uuid::new_v4();

    pipeline
        .collect_file(user, session_id, "notes.txt", "Retail stores adopt edge AI.")
        .await
        .unwrap();
    let err = pipeline
        .extract_insights(user, session_id, Some("edge ai"), Some("Retail CTOs"))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Store(_)), "got {err:?}");
    let session = store.tables.lock().unwrap().sessions[&session_id].clone();
    assert_eq!(session.stage, Stage::Input);
    assert_eq!(session.keywords, None);
    assert_eq!(session.target_audience, None);
}
