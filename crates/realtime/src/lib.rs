//! Client side of the call-screening backend: REST snapshot fetcher, a
//! supervised server-push subscription, and the reconciler that folds both
//! into one dashboard state.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fetcher;
pub mod live;
pub mod reconciler;
pub mod reconnect;
pub mod subscription;
pub mod transport;

pub use config::{ClientConfig, VoiceCredentials, VoiceFeatures};
pub use dispatcher::{Dispatch, Dispatcher};
pub use error::{ApiError, ApiErrorKind, ConfigError, StreamError};
pub use fetcher::{ApiClient, DashboardSnapshot, FetchPolicy};
pub use live::{LiveDashboard, Observers};
pub use reconciler::{ActivityEntry, ActivityKind, DashboardState, Reconciled, Reconciler};
pub use reconnect::{ConnectionState, ReconnectController, ReconnectPolicy};
pub use subscription::{Subscription, SubscriptionHandle};
pub use transport::{Connection, HttpTransport, SseDecoder, SseFrame, Transport};
