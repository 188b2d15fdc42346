use std::sync::Arc;

use chrono::Utc;
use rmcp::{
    RoleServer,
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::{
    catalog_db::CatalogDb,
    error,
    search::{self, SearchPage, SearchRequest},
};

#[derive(Clone)]
pub struct MangaShelfMcpServer {
    db: Arc<CatalogDb>,
    tool_router: ToolRouter<Self>,
}

impl MangaShelfMcpServer {
    pub fn new(db: CatalogDb) -> Self {
        Self {
            db: Arc::new(db),
            tool_router: Self::tool_router(),
        }
    }

    /// Run a search on the blocking pool, abandoning it once `cancel` fires.
    async fn search_page(
        &self,
        params: SearchParams,
        cancel: CancellationToken,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let request = SearchRequest::new(
            Some(params.query.as_str()),
            params.page,
            params.limit,
        )
        .map_err(|e| rmcp::ErrorData::invalid_params(e.to_string(), None))?;

        let db = Arc::clone(&self.db);
        let page = tokio::task::spawn_blocking(move || {
            search::execute_search(db.as_ref(), &request, &cancel, Utc::now())
        })
        .await
        .map_err(|e| mcp_error("search task failed", e))?
        .map_err(|e| mcp_error("search failed", e))?;

        let summary = format_search_summary(&page);
        let structured = serde_json::to_value(&page)
            .map_err(|e| mcp_error("failed to serialize search results", e))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }
}

#[tool_router(router = tool_router)]
impl MangaShelfMcpServer {
    /// Ranked title search with pagination.
    #[tool(
        name = "mangashelf_search",
        description = "Search manga titles by name or alternative title. Results are ranked by relevance and paginated; check `truncated` before paging deep."
    )]
    pub async fn mangashelf_search(
        &self,
        params: Parameters<SearchParams>,
        context: rmcp::service::RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        self.search_page(params.0, context.ct.clone()).await
    }

    /// Fetch one title without counting a view.
    #[tool(
        name = "mangashelf_get_title",
        description = "Fetch a manga title by id, including its stats. Does not count as a view."
    )]
    pub async fn mangashelf_get_title(
        &self,
        params: Parameters<GetTitleParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let id = params.0.id;
        let db = Arc::clone(&self.db);
        let lookup = id.clone();
        let record =
            tokio::task::spawn_blocking(move || db.record_view(&lookup, true))
                .await
                .map_err(|e| mcp_error("lookup task failed", e))?;

        let record = match record {
            Ok(record) => record,
            Err(error::Error::NotFound { .. }) => {
                return Err(rmcp::ErrorData::invalid_params(
                    format!("title not found: {id}"),
                    None,
                ));
            }
            Err(e) => return Err(mcp_error("lookup failed", e)),
        };

        let text = format!(
            "{} ({})\nstatus: {} · views: {} · rating: {:.1} ({} votes)",
            record.title,
            record.id,
            record.status,
            record.stats.views,
            record.stats.average_rating,
            record.stats.total_ratings
        );
        let structured = serde_json::to_value(&record)
            .map_err(|e| mcp_error("failed to serialize title", e))?;

        let mut result = CallToolResult::success(vec![Content::text(text)]);
        result.structured_content = Some(structured);
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for MangaShelfMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("mangashelf", env!("CARGO_PKG_VERSION"))
                    .with_title("mangashelf MCP"),
            )
            .with_instructions(
                "Use mangashelf_search to find titles, then mangashelf_get_title for details.",
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Search query string.
    pub query: String,
    /// Page number, starting at 1 (default: 1).
    pub page: Option<i64>,
    /// Results per page, clamped to 1..=50 (default: 20).
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetTitleParams {
    /// Title id.
    pub id: String,
}

fn format_search_summary(page: &SearchPage) -> String {
    if page.items.is_empty() {
        return format!("No results found for \"{}\"", page.query);
    }

    let mut lines = Vec::with_capacity(page.items.len() + 1);
    lines.push(format!(
        "Page {}/{} of {} match(es) for \"{}\":",
        page.page, page.total_pages, page.total_matches, page.query
    ));

    for hit in &page.items {
        lines.push(format!(
            "{} {} {}",
            hit.title.id, hit.score, hit.title.title
        ));
    }

    if page.truncated {
        lines.push(format!(
            "(only the top {} candidates were ranked)",
            page.pool_size
        ));
    }

    lines.join("\n")
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

pub fn run_mcp(db: CatalogDb) -> error::Result<()> {
    let server = MangaShelfMcpServer::new(db);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error::Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            error::Error::Config(format!(
                "MCP server initialization failed: {e}"
            ))
        })?;
        running.waiting().await.map_err(|e| {
            error::Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewTitle;

    fn server_with(
        titles: &[(&str, &str)],
    ) -> (tempfile::TempDir, MangaShelfMcpServer) {
        let tmp = tempfile::tempdir().unwrap();
        let db = CatalogDb::open(&tmp.path().join("catalog.redb")).unwrap();
        for (id, title) in titles {
            db.create_title(NewTitle {
                id: Some(id.to_string()),
                title: title.to_string(),
                ..Default::default()
            })
            .unwrap();
        }
        (tmp, MangaShelfMcpServer::new(db))
    }

    fn summary_text(result: &CallToolResult) -> String {
        result
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn search_tool_returns_structured_page() {
        let (_tmp, server) = server_with(&[
            ("m1", "Monster"),
            ("m2", "Monster Musume"),
            ("v1", "Vagabond"),
        ]);

        let params = SearchParams {
            query: "monster".to_string(),
            page: None,
            limit: Some(10),
        };
        let result = server
            .search_page(params, CancellationToken::new())
            .await
            .unwrap();

        let structured = result.structured_content.clone().expect("structured");
        let items = structured
            .get("items")
            .and_then(|v| v.as_array())
            .expect("items array");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].get("id").and_then(|v| v.as_str()), Some("m1"));
        assert_eq!(
            structured.get("totalMatches").and_then(|v| v.as_u64()),
            Some(2)
        );
        assert_eq!(
            structured.get("truncated").and_then(|v| v.as_bool()),
            Some(false)
        );

        assert!(summary_text(&result).contains("2 match(es)"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn search_tool_rejects_empty_query() {
        let (_tmp, server) = server_with(&[]);
        let params = SearchParams {
            query: "  ".to_string(),
            page: None,
            limit: None,
        };
        let cancel = CancellationToken::new();
        assert!(server.search_page(params, cancel).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_request_abandons_search() {
        let (_tmp, server) = server_with(&[("m1", "Monster")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let params = SearchParams {
            query: "monster".to_string(),
            page: None,
            limit: None,
        };
        assert!(server.search_page(params, cancel).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_title_does_not_count_views() {
        let (_tmp, server) = server_with(&[("b1", "Berserk")]);

        for _ in 0..2 {
            let result = server
                .mangashelf_get_title(Parameters(GetTitleParams {
                    id: "b1".to_string(),
                }))
                .await
                .unwrap();
            let views = result
                .structured_content
                .as_ref()
                .and_then(|v| v.pointer("/stats/views"))
                .and_then(|v| v.as_u64());
            assert_eq!(views, Some(0));
        }

        let missing = server
            .mangashelf_get_title(Parameters(GetTitleParams {
                id: "nope".to_string(),
            }))
            .await;
        assert!(missing.is_err());
    }
}
