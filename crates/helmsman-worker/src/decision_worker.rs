//! The decision polling loop: turns polled decision tasks into replay
//! decider runs and sends the resulting commands back.

use crate::registry::WorkflowRegistry;
use crate::service::WorkflowService;
use helmsman_replay::ReplayDecider;
use helmsman_types::{
    PollForDecisionTaskRequest, PollForDecisionTaskResponse, QueryTaskCompletedType,
    RespondDecisionTaskCompletedRequest, RespondQueryTaskCompletedRequest, TaskList,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info};

pub(crate) struct DecisionTaskHandler {
    pub service: Arc<dyn WorkflowService>,
    pub registry: Arc<WorkflowRegistry>,
    pub domain: String,
    pub task_list: String,
    pub identity: String,
    pub binary_checksum: String,
}

impl DecisionTaskHandler {
    pub async fn poll_once(&self) {
        let request = PollForDecisionTaskRequest {
            domain: self.domain.clone(),
            task_list: TaskList::new(self.task_list.clone()),
            identity: self.identity.clone(),
        };
        let task = match self.service.poll_for_decision_task(request).await {
            Ok(task) => task,
            Err(error) => {
                error!(%error, "PollForDecisionTask failed");
                return;
            }
        };
        if task.task_token.is_empty() {
            debug!("decision poll timed out without work");
            return;
        }
        self.process_task(task).await;
    }

    pub async fn process_task(&self, task: PollForDecisionTaskResponse) {
        let workflow_type = task.workflow_type.name.clone();
        let Some(registration) = self.registry.get(&workflow_type) else {
            error!(workflow_type, "workflow type not registered");
            if task.query.is_some() {
                self.respond_query_failed(
                    task.task_token,
                    format!("workflow type not registered: {workflow_type}"),
                )
                .await;
            }
            return;
        };

        debug!(
            workflow_type,
            execution = %task.workflow_execution,
            events = task.history.events.len(),
            query = task.query.is_some(),
            "processing decision task"
        );
        let workflow = (registration.factory)();
        let mut decider = ReplayDecider::new(
            task.workflow_execution.clone(),
            task.workflow_type.clone(),
            workflow,
        );
        let replay_outcome = decider.decide(task.history.events);

        match (replay_outcome, task.query) {
            (Err(error), None) => {
                // No response: the service redelivers the task, surfacing
                // the same nondeterminism until the worker code is fixed.
                error!(workflow_type, %error, "decision replay failed");
            }
            (Err(error), Some(_)) => {
                self.respond_query_failed(task.task_token, error.to_string())
                    .await;
            }
            (Ok(decisions), None) => {
                debug!(workflow_type, count = decisions.len(), "responding with decisions");
                let request = RespondDecisionTaskCompletedRequest {
                    task_token: task.task_token,
                    decisions,
                    identity: self.identity.clone(),
                    binary_checksum: Some(self.binary_checksum.clone()),
                };
                if let Err(error) = self.service.respond_decision_task_completed(request).await {
                    error!(%error, "RespondDecisionTaskCompleted failed");
                }
            }
            (Ok(_), Some(query)) => {
                let response = match decider.handle_query(&query) {
                    Ok(result) => RespondQueryTaskCompletedRequest {
                        task_token: task.task_token,
                        completed_type: QueryTaskCompletedType::Completed,
                        query_result: Some(result),
                        error_message: None,
                    },
                    Err(error) => RespondQueryTaskCompletedRequest {
                        task_token: task.task_token,
                        completed_type: QueryTaskCompletedType::Failed,
                        query_result: None,
                        error_message: Some(error.to_string()),
                    },
                };
                if let Err(error) = self.service.respond_query_task_completed(response).await {
                    error!(%error, "RespondQueryTaskCompleted failed");
                }
            }
        }
    }

    async fn respond_query_failed(&self, task_token: Vec<u8>, message: String) {
        let request = RespondQueryTaskCompletedRequest {
            task_token,
            completed_type: QueryTaskCompletedType::Failed,
            query_result: None,
            error_message: Some(message),
        };
        if let Err(error) = self.service.respond_query_task_completed(request).await {
            error!(%error, "RespondQueryTaskCompleted failed");
        }
    }
}

pub(crate) async fn decision_task_loop(handler: DecisionTaskHandler, stop: Arc<AtomicBool>) {
    info!(identity = handler.identity, "decision task worker started");
    while !stop.load(Ordering::SeqCst) {
        handler.poll_once().await;
    }
    info!(identity = handler.identity, "decision task worker stopped");
}
