//! Client-side launching API: start, signal, cancel, and query workflow
//! executions from outside a workflow.
//!
//! The transport lives behind [`WorkflowClientService`]; this module only
//! shapes requests: JSON argument wrapping, request ids, and the defaults
//! carried by a workflow type's registration options.

use crate::registry::WorkflowRegistrationOptions;
use crate::service::ServiceError;
use async_trait::async_trait;
use helmsman_types::{
    QueryWorkflowRequest, QueryWorkflowResponse, RequestCancelWorkflowExecutionRequest,
    SignalWorkflowExecutionRequest, StartWorkflowExecutionRequest,
    StartWorkflowExecutionResponse, TaskList, WorkflowExecution, WorkflowQuery, WorkflowType,
    decode_value, encode_args,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// The client-facing subset of the service API.
#[async_trait]
pub trait WorkflowClientService: Send + Sync {
    async fn start_workflow_execution(
        &self,
        request: StartWorkflowExecutionRequest,
    ) -> Result<StartWorkflowExecutionResponse, ServiceError>;

    async fn signal_workflow_execution(
        &self,
        request: SignalWorkflowExecutionRequest,
    ) -> Result<(), ServiceError>;

    async fn request_cancel_workflow_execution(
        &self,
        request: RequestCancelWorkflowExecutionRequest,
    ) -> Result<(), ServiceError>;

    async fn query_workflow(
        &self,
        request: QueryWorkflowRequest,
    ) -> Result<QueryWorkflowResponse, ServiceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("payload codec: {0}")]
    Payload(String),
    #[error("workflow registration options carry no task list and none was configured")]
    MissingTaskList,
}

/// Launches and addresses workflow executions in one domain.
pub struct WorkflowClient {
    service: Arc<dyn WorkflowClientService>,
    domain: String,
    identity: String,
    default_task_list: Option<String>,
}

impl WorkflowClient {
    pub fn new(
        service: Arc<dyn WorkflowClientService>,
        domain: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            service,
            domain: domain.into(),
            identity: identity.into(),
            default_task_list: None,
        }
    }

    pub fn with_default_task_list(mut self, task_list: impl Into<String>) -> Self {
        self.default_task_list = Some(task_list.into());
        self
    }

    /// Stub bound to one workflow type's registration options, launching
    /// executions of it via futures-shaped calls.
    pub fn new_workflow_stub(&self, options: WorkflowRegistrationOptions) -> WorkflowStub<'_> {
        WorkflowStub {
            client: self,
            options,
        }
    }

    pub async fn signal_workflow(
        &self,
        execution: &WorkflowExecution,
        signal_name: &str,
        args: &[Value],
    ) -> Result<(), ClientError> {
        let request = SignalWorkflowExecutionRequest {
            domain: self.domain.clone(),
            workflow_execution: execution.clone(),
            signal_name: signal_name.to_string(),
            input: Some(encode_args(args).map_err(|error| ClientError::Payload(error.to_string()))?),
            identity: self.identity.clone(),
            request_id: Uuid::new_v4().to_string(),
        };
        self.service.signal_workflow_execution(request).await?;
        Ok(())
    }

    pub async fn request_cancel_workflow(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<(), ClientError> {
        let request = RequestCancelWorkflowExecutionRequest {
            domain: self.domain.clone(),
            workflow_execution: execution.clone(),
            identity: self.identity.clone(),
        };
        self.service.request_cancel_workflow_execution(request).await?;
        Ok(())
    }

    pub async fn query_workflow<T: DeserializeOwned>(
        &self,
        execution: &WorkflowExecution,
        query_type: &str,
        args: &[Value],
    ) -> Result<T, ClientError> {
        let request = QueryWorkflowRequest {
            domain: self.domain.clone(),
            execution: execution.clone(),
            query: WorkflowQuery {
                query_type: query_type.to_string(),
                query_args: Some(
                    encode_args(args).map_err(|error| ClientError::Payload(error.to_string()))?,
                ),
            },
        };
        let response = self.service.query_workflow(request).await?;
        decode_value(response.query_result.as_deref())
            .map_err(|error| ClientError::Payload(error.to_string()))
    }
}

/// Addresses one workflow type; starting it yields the running execution.
pub struct WorkflowStub<'a> {
    client: &'a WorkflowClient,
    options: WorkflowRegistrationOptions,
}

impl WorkflowStub<'_> {
    /// Start a new execution. The workflow id comes from the registration
    /// options when set, otherwise a fresh UUID.
    pub async fn start(&self, args: &[Value]) -> Result<WorkflowExecution, ClientError> {
        let workflow_id = self
            .options
            .workflow_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let task_list = self
            .options
            .task_list
            .clone()
            .or_else(|| self.client.default_task_list.clone())
            .ok_or(ClientError::MissingTaskList)?;
        let request = StartWorkflowExecutionRequest {
            domain: self.client.domain.clone(),
            workflow_id: workflow_id.clone(),
            workflow_type: WorkflowType::new(self.options.name.clone()),
            task_list: TaskList::new(task_list),
            input: Some(
                encode_args(args).map_err(|error| ClientError::Payload(error.to_string()))?,
            ),
            execution_start_to_close_timeout_seconds: self
                .options
                .execution_start_to_close_timeout_seconds,
            task_start_to_close_timeout_seconds: self
                .options
                .task_start_to_close_timeout_seconds,
            identity: self.client.identity.clone(),
            request_id: Uuid::new_v4().to_string(),
            cron_schedule: self.options.cron_schedule.clone(),
            retry_policy: None,
        };
        let response = self.client.service.start_workflow_execution(request).await?;
        let execution = WorkflowExecution::new(workflow_id, response.run_id);
        info!(workflow_type = self.options.name, execution = %execution, "started workflow");
        Ok(execution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingClientService {
        starts: Mutex<Vec<StartWorkflowExecutionRequest>>,
        signals: Mutex<Vec<SignalWorkflowExecutionRequest>>,
        cancels: Mutex<Vec<RequestCancelWorkflowExecutionRequest>>,
    }

    #[async_trait]
    impl WorkflowClientService for RecordingClientService {
        async fn start_workflow_execution(
            &self,
            request: StartWorkflowExecutionRequest,
        ) -> Result<StartWorkflowExecutionResponse, ServiceError> {
            self.starts.lock().unwrap().push(request);
            Ok(StartWorkflowExecutionResponse {
                run_id: "run-1".into(),
            })
        }

        async fn signal_workflow_execution(
            &self,
            request: SignalWorkflowExecutionRequest,
        ) -> Result<(), ServiceError> {
            self.signals.lock().unwrap().push(request);
            Ok(())
        }

        async fn request_cancel_workflow_execution(
            &self,
            request: RequestCancelWorkflowExecutionRequest,
        ) -> Result<(), ServiceError> {
            self.cancels.lock().unwrap().push(request);
            Ok(())
        }

        async fn query_workflow(
            &self,
            _request: QueryWorkflowRequest,
        ) -> Result<QueryWorkflowResponse, ServiceError> {
            Ok(QueryWorkflowResponse {
                query_result: Some(b"\"pong\"".to_vec()),
            })
        }
    }

    fn client(service: Arc<RecordingClientService>) -> WorkflowClient {
        WorkflowClient::new(service, "test-domain", "client@test")
            .with_default_task_list("test-tasks")
    }

    #[tokio::test]
    async fn starting_a_stub_fills_in_registration_defaults() {
        let service = Arc::new(RecordingClientService::default());
        let client = client(Arc::clone(&service));
        let mut options = WorkflowRegistrationOptions::new("Greeting");
        options.execution_start_to_close_timeout_seconds = Some(3_600);

        let execution = client
            .new_workflow_stub(options)
            .start(&[json!("Bob")])
            .await
            .unwrap();

        assert_eq!(execution.run_id, "run-1");
        let starts = service.starts.lock().unwrap();
        assert_eq!(starts.len(), 1);
        let request = &starts[0];
        assert_eq!(request.workflow_type.name, "Greeting");
        assert_eq!(request.task_list.name, "test-tasks");
        assert_eq!(request.input.as_deref(), Some(b"\"Bob\"".as_slice()));
        assert_eq!(request.execution_start_to_close_timeout_seconds, Some(3_600));
        assert!(!request.request_id.is_empty());
        assert_eq!(request.workflow_id, execution.workflow_id);
    }

    #[tokio::test]
    async fn starting_without_a_task_list_is_rejected() {
        let service = Arc::new(RecordingClientService::default());
        let client = WorkflowClient::new(
            Arc::clone(&service) as Arc<dyn WorkflowClientService>,
            "test-domain",
            "client@test",
        );

        let err = client
            .new_workflow_stub(WorkflowRegistrationOptions::new("Greeting"))
            .start(&[])
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::MissingTaskList));
    }

    #[tokio::test]
    async fn signals_and_queries_round_trip() {
        let service = Arc::new(RecordingClientService::default());
        let client = client(Arc::clone(&service));
        let execution = WorkflowExecution::new("wf-1", "run-1");

        client
            .signal_workflow(&execution, "wait_for_name", &[json!("Bob")])
            .await
            .unwrap();
        let signals = service.signals.lock().unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_name, "wait_for_name");
        assert_eq!(signals[0].input.as_deref(), Some(b"\"Bob\"".as_slice()));
        drop(signals);

        let answer: String = client
            .query_workflow(&execution, "ping", &[])
            .await
            .unwrap();
        assert_eq!(answer, "pong");

        client.request_cancel_workflow(&execution).await.unwrap();
        assert_eq!(service.cancels.lock().unwrap().len(), 1);
    }
}
