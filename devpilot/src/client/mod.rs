//! HTTP client for the deploy and lifecycle streams
//!
//! Reads the chunked response as it arrives and hands every complete line to
//! the caller while tracking the completion protocol outcome.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use colored::Colorize;
use futures::StreamExt;
use reqwest::{Client, Method, RequestBuilder, Response};
use tracing::{debug, error};

use crate::deploy::config::DeploymentConfig;
use crate::deploy::lifecycle::LifecycleOperation;
use crate::errors::PilotError;
use crate::protocol::consumer::{ConsumerEvent, DeployOutcome, StreamConsumer};
use crate::protocol::{DeployStatus, Marker};
use crate::remote::STDERR_PREFIX;
use crate::server::caller::CALLER_HEADER;

/// Project action the client can trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAction {
    Operation(LifecycleOperation),
    Redeploy,
}

impl ClientAction {
    fn method(&self) -> Method {
        match self {
            ClientAction::Operation(LifecycleOperation::Logs) => Method::GET,
            ClientAction::Operation(LifecycleOperation::Delete) => Method::DELETE,
            _ => Method::POST,
        }
    }

    fn segment(&self) -> &'static str {
        match self {
            ClientAction::Operation(operation) => operation.as_str(),
            ClientAction::Redeploy => "redeploy",
        }
    }
}

impl fmt::Display for ClientAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

impl FromStr for ClientAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("redeploy") {
            return Ok(ClientAction::Redeploy);
        }
        s.parse::<LifecycleOperation>().map(ClientAction::Operation)
    }
}

/// Client for a DevPilot server
pub struct DeployClient {
    client: Client,
    base_url: String,
    user: String,
}

impl DeployClient {
    /// Create a client acting as `user`
    pub fn new(base_url: &str, user: &str) -> Result<Self, PilotError> {
        url::Url::parse(base_url)
            .map_err(|e| PilotError::ConfigError(format!("Invalid server URL {}: {}", base_url, e)))?;
        if user.trim().is_empty() {
            return Err(PilotError::ConfigError("A user id is required".to_string()));
        }

        // No overall timeout: a deploy stream lasts as long as the remote command
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a deploy and follow its stream to the end
    pub async fn deploy(
        &self,
        config: &DeploymentConfig,
        on_event: impl FnMut(&ConsumerEvent),
    ) -> Result<DeployOutcome, PilotError> {
        let request = self.request(Method::POST, "/deploy").json(config);
        let response = self.send(request).await?;
        consume(response, on_event).await
    }

    /// Run a project action and follow its stream to the end
    pub async fn action(
        &self,
        action: ClientAction,
        project_id: &str,
        on_event: impl FnMut(&ConsumerEvent),
    ) -> Result<DeployOutcome, PilotError> {
        let path = format!("/project/{}/{}", project_id, action.segment());
        let response = self.send(self.request(action.method(), &path)).await?;
        consume(response, on_event).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        self.client
            .request(method, url)
            .header(CALLER_HEADER, &self.user)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, PilotError> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Request rejected: {} - {}", status, body);
            return Err(PilotError::ServerError(format!("{}: {}", status, body)));
        }
        Ok(response)
    }
}

async fn consume(
    response: Response,
    mut on_event: impl FnMut(&ConsumerEvent),
) -> Result<DeployOutcome, PilotError> {
    let mut consumer = StreamConsumer::new();
    let mut chunks = response.bytes_stream();

    while let Some(chunk) = chunks.next().await {
        for event in consumer.push(&chunk?) {
            on_event(&event);
        }
    }
    for event in consumer.finish() {
        on_event(&event);
    }
    Ok(consumer.outcome().clone())
}

/// Print one stream event to the terminal
pub fn render(event: &ConsumerEvent) {
    match event {
        ConsumerEvent::Line(line) => {
            let is_stderr = line.as_bytes().starts_with(STDERR_PREFIX);
            if is_stderr {
                println!("{}", line.red());
            } else {
                println!("{}", line);
            }
        }
        ConsumerEvent::Marker(Marker::Status(status)) => {
            let label = format!("Deploy status: {}", status);
            match status {
                DeployStatus::Success => println!("{}", label.green().bold()),
                _ => println!("{}", label.red().bold()),
            }
        }
        ConsumerEvent::Marker(Marker::ProjectId(id)) => {
            println!("{} {}", "Project:".bold(), id);
        }
        ConsumerEvent::Marker(Marker::RedirectUrl(url)) => {
            println!("{} {}", "Open:".bold(), url.cyan());
        }
    }
}
