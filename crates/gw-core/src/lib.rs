//! The concurrency, isolation, and resource-control substrate (spec §1):
//! the async connection pool over a blocking warehouse driver, the
//! per-request ambient context, the layered database-operation wrappers,
//! and the session/multiplexer/isolation/allocator layer that scopes
//! resources per client.

pub mod allocator;
pub mod context;
pub mod driver;
pub mod error;
pub mod isolation;
pub mod multiplex;
pub mod ops;
pub mod pool;
pub mod session;
pub mod transaction;

pub use allocator::{AllocationStrategy, ResourceAllocator, ResourcePool};
pub use context::{ContextSnapshot, RecordedError, RequestContext, RequestMetrics, RequestRegistry};
pub use driver::{BlockingDriverConnection, DriverAdapter, DriverError, QueryResult, Row};
pub use error::GatewayError;
pub use isolation::{ClientIsolationManager, IsolationAccessValidator, IsolationContext, IsolationLevel, IsolationProfile, ResourceKind};
pub use multiplex::{ConnectionMultiplexer, LeasedConnection};
pub use ops::{isolated_db_ops, transactional_db_ops, AccessValidator, IsolatedOps, PlainOps, TransactionalOps};
pub use pool::{Checkout, ConnectionFactory, Pool};
pub use session::{SessionManager, SessionRecord, TransportKind};
pub use transaction::{TransactionManager, TransactionState};
