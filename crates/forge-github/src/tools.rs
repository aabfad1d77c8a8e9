//! Agent tool wrappers over the GitHub capability operations.
//!
//! Tools receive the resolved bearer credential through the client they
//! are constructed with; source selection happens upstream of tool
//! registration, never inside a tool.

use std::sync::Arc;

use async_trait::async_trait;
use forge_agent_core::{Agent, AgentTool, ToolExecutionResult};
use forge_ai::ToolDefinition;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::{GithubApiClient, IssueState};

const DEFAULT_LIST_LIMIT: usize = 10;

fn default_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

fn default_state() -> IssueState {
    IssueState::Open
}

fn default_base() -> String {
    "main".to_string()
}

fn tool_output(value: Result<Value, String>) -> ToolExecutionResult {
    match value {
        Ok(content) => ToolExecutionResult::ok(content),
        Err(message) => ToolExecutionResult::error(json!({ "error": message })),
    }
}

fn parse_arguments<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, String> {
    serde_json::from_value(arguments).map_err(|error| format!("invalid tool arguments: {error}"))
}

/// Registers the five GitHub capability tools on an agent.
pub fn register_github_tools(agent: &mut Agent, client: Arc<GithubApiClient>) {
    agent.register_tool(ListReposTool::new(client.clone()));
    agent.register_tool(GetRepoTool::new(client.clone()));
    agent.register_tool(ListIssuesTool::new(client.clone()));
    agent.register_tool(CreateIssueTool::new(client.clone()));
    agent.register_tool(CreatePullRequestTool::new(client));
}

/// Lists the authenticated user's repositories.
pub struct ListReposTool {
    client: Arc<GithubApiClient>,
}

impl ListReposTool {
    pub fn new(client: Arc<GithubApiClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ListReposArgs {
    #[serde(default = "default_limit")]
    limit: usize,
}

#[async_trait]
impl AgentTool for ListReposTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_github_repos".to_string(),
            description: "List the authenticated user's GitHub repositories".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Maximum number of repositories to return"
                    }
                }
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let result = async {
            let args: ListReposArgs = parse_arguments(arguments)?;
            let repos = self
                .client
                .list_repos(args.limit)
                .await
                .map_err(|error| error.to_string())?;
            serde_json::to_value(repos).map_err(|error| error.to_string())
        }
        .await;
        tool_output(result)
    }
}

/// Fetches detail for one repository.
pub struct GetRepoTool {
    client: Arc<GithubApiClient>,
}

impl GetRepoTool {
    pub fn new(client: Arc<GithubApiClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct GetRepoArgs {
    repo_full_name: String,
}

#[async_trait]
impl AgentTool for GetRepoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_repo_info".to_string(),
            description: "Get detailed information about a repository".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "repo_full_name": {
                        "type": "string",
                        "description": "Repository full name, e.g. owner/repo"
                    }
                },
                "required": ["repo_full_name"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let result = async {
            let args: GetRepoArgs = parse_arguments(arguments)?;
            let repo = self
                .client
                .get_repo(&args.repo_full_name)
                .await
                .map_err(|error| error.to_string())?;
            serde_json::to_value(repo).map_err(|error| error.to_string())
        }
        .await;
        tool_output(result)
    }
}

/// Lists repository issues; pull requests are excluded.
pub struct ListIssuesTool {
    client: Arc<GithubApiClient>,
}

impl ListIssuesTool {
    pub fn new(client: Arc<GithubApiClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ListIssuesArgs {
    repo_full_name: String,
    #[serde(default = "default_state")]
    state: IssueState,
    #[serde(default = "default_limit")]
    limit: usize,
}

#[async_trait]
impl AgentTool for ListIssuesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_github_issues".to_string(),
            description: "List issues for a repository (pull requests excluded)".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "repo_full_name": {
                        "type": "string",
                        "description": "Repository full name, e.g. owner/repo"
                    },
                    "state": {
                        "type": "string",
                        "enum": ["open", "closed", "all"],
                        "description": "Issue state filter"
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Maximum number of issues to return"
                    }
                },
                "required": ["repo_full_name"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let result = async {
            let args: ListIssuesArgs = parse_arguments(arguments)?;
            let issues = self
                .client
                .list_issues(&args.repo_full_name, args.state, args.limit)
                .await
                .map_err(|error| error.to_string())?;
            serde_json::to_value(issues).map_err(|error| error.to_string())
        }
        .await;
        tool_output(result)
    }
}

/// Creates a new issue with optional labels.
pub struct CreateIssueTool {
    client: Arc<GithubApiClient>,
}

impl CreateIssueTool {
    pub fn new(client: Arc<GithubApiClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct CreateIssueArgs {
    repo_full_name: String,
    title: String,
    body: String,
    #[serde(default)]
    labels: Vec<String>,
}

#[async_trait]
impl AgentTool for CreateIssueTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "create_github_issue".to_string(),
            description: "Create a new issue in a repository".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "repo_full_name": {
                        "type": "string",
                        "description": "Repository full name, e.g. owner/repo"
                    },
                    "title": { "type": "string", "description": "Issue title" },
                    "body": { "type": "string", "description": "Issue body" },
                    "labels": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Optional label names"
                    }
                },
                "required": ["repo_full_name", "title", "body"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let result = async {
            let args: CreateIssueArgs = parse_arguments(arguments)?;
            let issue = self
                .client
                .create_issue(&args.repo_full_name, &args.title, &args.body, &args.labels)
                .await
                .map_err(|error| error.to_string())?;
            serde_json::to_value(issue).map_err(|error| error.to_string())
        }
        .await;
        tool_output(result)
    }
}

/// Opens a pull request from a head branch into a base branch.
pub struct CreatePullRequestTool {
    client: Arc<GithubApiClient>,
}

impl CreatePullRequestTool {
    pub fn new(client: Arc<GithubApiClient>) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct CreatePullRequestArgs {
    repo_full_name: String,
    title: String,
    body: String,
    head: String,
    #[serde(default = "default_base")]
    base: String,
}

#[async_trait]
impl AgentTool for CreatePullRequestTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "create_pull_request".to_string(),
            description: "Create a pull request from a head branch into a base branch".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "repo_full_name": {
                        "type": "string",
                        "description": "Repository full name, e.g. owner/repo"
                    },
                    "title": { "type": "string", "description": "Pull request title" },
                    "body": { "type": "string", "description": "Pull request description" },
                    "head": { "type": "string", "description": "Source branch" },
                    "base": { "type": "string", "description": "Target branch (default: main)" }
                },
                "required": ["repo_full_name", "title", "body", "head"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let result = async {
            let args: CreatePullRequestArgs = parse_arguments(arguments)?;
            let pull_request = self
                .client
                .create_pull_request(
                    &args.repo_full_name,
                    &args.title,
                    &args.body,
                    &args.head,
                    &args.base,
                )
                .await
                .map_err(|error| error.to_string())?;
            serde_json::to_value(pull_request).map_err(|error| error.to_string())
        }
        .await;
        tool_output(result)
    }
}
