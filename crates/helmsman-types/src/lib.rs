pub mod decision;
pub mod event;
pub mod execution;
pub mod failure;
pub mod payload;
pub mod retry;
pub mod task;

pub use decision::{
    CancelTimerAttributes, CancelWorkflowExecutionAttributes,
    CompleteWorkflowExecutionAttributes, Decision, DecisionType,
    FailWorkflowExecutionAttributes, RecordMarkerAttributes,
    RequestCancelActivityTaskAttributes, ScheduleActivityTaskAttributes, StartTimerAttributes,
};
pub use event::{EventAttributes, EventType, HistoryEvent, TimeoutType};
pub use execution::{ActivityType, Header, TaskList, WorkflowExecution, WorkflowType};
pub use failure::{
    ActivityFailure, ActivityTimeout, ApplicationFailure, CancelledError, FAILURE_SOURCE,
    RemoteFailure, SerializedFailure, WorkflowError, deserialize_failure,
};
pub use payload::{PayloadError, decode_args, decode_value, encode_args, encode_value};
pub use retry::RetryPolicy;
pub use task::{
    History, PollForActivityTaskRequest, PollForActivityTaskResponse,
    PollForDecisionTaskRequest, PollForDecisionTaskResponse, QueryTaskCompletedType,
    QueryWorkflowRequest, QueryWorkflowResponse, RecordActivityTaskHeartbeatRequest,
    RecordActivityTaskHeartbeatResponse, RequestCancelWorkflowExecutionRequest,
    RespondActivityTaskCompletedRequest, RespondActivityTaskFailedRequest,
    RespondDecisionTaskCompletedRequest, RespondQueryTaskCompletedRequest,
    SignalWorkflowExecutionRequest, StartWorkflowExecutionRequest,
    StartWorkflowExecutionResponse, WorkflowQuery,
};
