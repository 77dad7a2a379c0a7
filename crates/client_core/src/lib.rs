pub mod api_client;
pub mod controller;
pub mod debounce;
pub mod error;
pub mod failure_gate;
pub mod list_state;
pub mod network;
pub mod normalize;
pub mod notify;
pub mod resources;

pub use api_client::{ApiClient, ApiClientOptions, ApiResponse, RequestOptions};
pub use controller::{
    AsyncListController, ControllerOptions, HasMorePolicy, LoadOutcome, MutationOutcome,
    Optimistic, PendingMutation,
};
pub use debounce::{DebouncedAction, DEFAULT_RETRY_QUIET};
pub use error::RequestError;
pub use failure_gate::{FailureGate, FailureGateOptions};
pub use list_state::{ErrorKind, Filters, ListState, ListStatus, OFFLINE_MESSAGE};
pub use network::{AlwaysOnline, NetworkStatus, SharedNetworkStatus};
pub use normalize::Entity;
pub use notify::{NotificationSink, Toast, ToastQueue, Tone, TracingSink};
pub use resources::{
    AlertEventsResource, AlertRulesResource, InstancesResource, ListResource, Mutation,
    MutationKind, PageQuery, RecommendationsResource,
};
