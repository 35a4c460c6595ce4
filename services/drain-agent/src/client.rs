//! HTTP clients for the collaborator services.
//!
//! - [`EcsClient`]: cluster manager, JSON 1.1 protocol (`X-Amz-Target`)
//! - [`AutoScalingClient`]: fleet manager, Query protocol
//! - [`SnsClient`]: resubmission channel, Query protocol
//!
//! Requests are sent unsigned. Production endpoints point at a signing
//! proxy; local runs point at an emulator.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::gateway::{
    ClusterManager, FleetManager, GatewayError, LifecycleAction, NodeHandle, NodeStatus,
    ResubmissionChannel, Workload, WorkloadState,
};

const ECS_TARGET_PREFIX: &str = "AmazonEC2ContainerServiceV20141113";
const AMZ_JSON_1_1: &str = "application/x-amz-json-1.1";
const AUTOSCALING_API_VERSION: &str = "2011-01-01";
const SNS_API_VERSION: &str = "2010-03-31";

fn build_http_client(config: &Config) -> Result<reqwest::Client, GatewayError> {
    let client = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .build()?;
    Ok(client)
}

/// Cluster manager client.
#[derive(Clone)]
pub struct EcsClient {
    client: reqwest::Client,
    endpoint: String,
}

impl EcsClient {
    /// Create a new cluster manager client.
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        Ok(Self::with_client(
            build_http_client(config)?,
            config.ecs_endpoint.clone(),
        ))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn call<Req, Resp>(&self, operation: &str, request: &Req) -> Result<Resp, GatewayError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let body =
            serde_json::to_vec(request).map_err(|e| GatewayError::Encoding(e.to_string()))?;
        debug!(operation, endpoint = %self.endpoint, "Calling cluster manager");

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Amz-Target", format!("{ECS_TARGET_PREFIX}.{operation}"))
            .header(reqwest::header::CONTENT_TYPE, AMZ_JSON_1_1)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(operation, status = %status, body = %body, "Cluster manager call failed");
            let (code, message) = match serde_json::from_str::<JsonErrorBody>(&body) {
                Ok(parsed) => (parsed.code(), parsed.message),
                Err(_) => (status.to_string(), body),
            };
            return Err(GatewayError::api(status.as_u16(), code, message));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ClusterManager for EcsClient {
    async fn list_nodes(&self, cluster: &str) -> Result<Vec<String>, GatewayError> {
        let mut arns = Vec::new();
        let mut next_token = None;
        loop {
            let request = ListContainerInstancesRequest {
                cluster,
                next_token,
            };
            let page: ListContainerInstancesResponse =
                self.call("ListContainerInstances", &request).await?;
            arns.extend(page.container_instance_arns);
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }
        Ok(arns)
    }

    async fn describe_nodes(
        &self,
        cluster: &str,
        node_arns: &[String],
    ) -> Result<Vec<NodeHandle>, GatewayError> {
        let request = DescribeContainerInstancesRequest {
            cluster,
            container_instances: node_arns,
        };
        let response: DescribeContainerInstancesResponse =
            self.call("DescribeContainerInstances", &request).await?;
        log_failures("DescribeContainerInstances", &response.failures);

        Ok(response
            .container_instances
            .into_iter()
            .map(|instance| NodeHandle {
                arn: instance.container_instance_arn,
                native_id: instance.ec2_instance_id.unwrap_or_default(),
                status: NodeStatus::from(instance.status.unwrap_or_default()),
            })
            .collect())
    }

    async fn set_draining(&self, cluster: &str, node_arn: &str) -> Result<(), GatewayError> {
        let request = UpdateContainerInstancesStateRequest {
            cluster,
            container_instances: [node_arn],
            status: NodeStatus::Draining.as_str(),
        };
        let response: UpdateContainerInstancesStateResponse =
            self.call("UpdateContainerInstancesState", &request).await?;

        match response.failures.first() {
            Some(failure) => Err(GatewayError::Rejected {
                reason: failure.describe(),
            }),
            None => Ok(()),
        }
    }

    async fn list_workloads(
        &self,
        cluster: &str,
        node_arn: &str,
    ) -> Result<Vec<String>, GatewayError> {
        let mut arns = Vec::new();
        let mut next_token = None;
        loop {
            let request = ListTasksRequest {
                cluster,
                container_instance: node_arn,
                next_token,
            };
            let page: ListTasksResponse = self.call("ListTasks", &request).await?;
            arns.extend(page.task_arns);
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }
        Ok(arns)
    }

    async fn describe_workloads(
        &self,
        cluster: &str,
        workload_arns: &[String],
    ) -> Result<Vec<Workload>, GatewayError> {
        let request = DescribeTasksRequest {
            cluster,
            tasks: workload_arns,
        };
        let response: DescribeTasksResponse = self.call("DescribeTasks", &request).await?;
        log_failures("DescribeTasks", &response.failures);

        Ok(response
            .tasks
            .into_iter()
            .map(|task| Workload {
                arn: task.task_arn,
                group: task.group.unwrap_or_default(),
                state: WorkloadState::from(task.last_status.unwrap_or_default()),
            })
            .collect())
    }

    async fn stop_workload(
        &self,
        cluster: &str,
        workload_arn: &str,
        reason: &str,
    ) -> Result<(), GatewayError> {
        let request = StopTaskRequest {
            cluster,
            task: workload_arn,
            reason,
        };
        let _: IgnoredAny = self.call("StopTask", &request).await?;
        Ok(())
    }
}

fn log_failures(operation: &str, failures: &[Failure]) {
    for failure in failures {
        warn!(operation, failure = %failure.describe(), "Cluster manager reported a failure");
    }
}

/// Fleet manager client.
#[derive(Clone)]
pub struct AutoScalingClient {
    client: reqwest::Client,
    endpoint: String,
}

impl AutoScalingClient {
    /// Create a new fleet manager client.
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        Ok(Self::with_client(
            build_http_client(config)?,
            config.autoscaling_endpoint.clone(),
        ))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl FleetManager for AutoScalingClient {
    async fn complete_lifecycle_action(
        &self,
        action: &LifecycleAction,
    ) -> Result<(), GatewayError> {
        let params = [
            ("Action", "CompleteLifecycleAction"),
            ("Version", AUTOSCALING_API_VERSION),
            ("AutoScalingGroupName", action.group_name.as_str()),
            ("LifecycleHookName", action.hook_name.as_str()),
            ("InstanceId", action.instance_id.as_str()),
            ("LifecycleActionResult", action.result.as_str()),
        ];
        query(&self.client, &self.endpoint, &params).await
    }
}

/// Resubmission channel client.
#[derive(Clone)]
pub struct SnsClient {
    client: reqwest::Client,
    endpoint: String,
}

impl SnsClient {
    /// Create a new resubmission channel client.
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        Ok(Self::with_client(
            build_http_client(config)?,
            config.sns_endpoint.clone(),
        ))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ResubmissionChannel for SnsClient {
    async fn publish(
        &self,
        channel: &str,
        subject: &str,
        payload: &Bytes,
    ) -> Result<(), GatewayError> {
        let message = std::str::from_utf8(payload)
            .map_err(|e| GatewayError::Encoding(format!("payload is not UTF-8: {e}")))?;
        let params = [
            ("Action", "Publish"),
            ("Version", SNS_API_VERSION),
            ("TopicArn", channel),
            ("Subject", subject),
            ("Message", message),
        ];
        query(&self.client, &self.endpoint, &params).await
    }
}

/// Send a Query protocol request and discard the response body.
async fn query(
    client: &reqwest::Client,
    endpoint: &str,
    params: &[(&str, &str)],
) -> Result<(), GatewayError> {
    let action = params
        .iter()
        .find(|(key, _)| *key == "Action")
        .map(|(_, value)| *value)
        .unwrap_or_default();
    debug!(action, endpoint, "Sending query request");

    let response = client.post(endpoint).form(params).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!(action, status = %status, body = %body, "Query request failed");
        let code = xml_element(&body, "Code").unwrap_or_else(|| status.to_string());
        let message = xml_element(&body, "Message").unwrap_or(body);
        return Err(GatewayError::api(status.as_u16(), code, message));
    }

    Ok(())
}

/// Text of the first `<name>` element in an XML error document.
fn xml_element(body: &str, name: &str) -> Option<String> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let start = body.find(&open)? + open.len();
    let end = start + body[start..].find(&close)?;
    Some(body[start..end].trim().to_string())
}

#[derive(Debug, Deserialize)]
struct JsonErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

impl JsonErrorBody {
    /// Error code without the namespace prefix.
    fn code(&self) -> String {
        self.kind
            .rsplit('#')
            .next()
            .unwrap_or(&self.kind)
            .to_string()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListContainerInstancesRequest<'a> {
    cluster: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListContainerInstancesResponse {
    #[serde(default)]
    container_instance_arns: Vec<String>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DescribeContainerInstancesRequest<'a> {
    cluster: &'a str,
    container_instances: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeContainerInstancesResponse {
    #[serde(default)]
    container_instances: Vec<ContainerInstance>,
    #[serde(default)]
    failures: Vec<Failure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerInstance {
    container_instance_arn: String,
    #[serde(default)]
    ec2_instance_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateContainerInstancesStateRequest<'a> {
    cluster: &'a str,
    container_instances: [&'a str; 1],
    status: &'a str,
}

#[derive(Debug, Deserialize)]
struct UpdateContainerInstancesStateResponse {
    #[serde(default)]
    failures: Vec<Failure>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListTasksRequest<'a> {
    cluster: &'a str,
    container_instance: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTasksResponse {
    #[serde(default)]
    task_arns: Vec<String>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct DescribeTasksRequest<'a> {
    cluster: &'a str,
    tasks: &'a [String],
}

#[derive(Debug, Deserialize)]
struct DescribeTasksResponse {
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    failures: Vec<Failure>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Task {
    task_arn: String,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    last_status: Option<String>,
}

#[derive(Debug, Serialize)]
struct StopTaskRequest<'a> {
    cluster: &'a str,
    task: &'a str,
    reason: &'a str,
}

#[derive(Debug, Deserialize)]
struct Failure {
    #[serde(default)]
    arn: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

impl Failure {
    fn describe(&self) -> String {
        let mut out = self.reason.clone().unwrap_or_else(|| "unknown".to_string());
        if let Some(arn) = &self.arn {
            out.push_str(&format!(" ({arn})"));
        }
        if let Some(detail) = &self.detail {
            out.push_str(&format!(": {detail}"));
        }
        out
    }
}
