//! Dynamic call-site linking.
//!
//! A host engine describes each dynamic operation with a
//! [`CallSiteDescriptor`] and dispatches through a [`RelinkableCallSite`].
//! On first use, and whenever cached targets stop applying, the site asks
//! its [`DynamicLinker`] to walk an ordered chain of pluggable linkers; the
//! winning [`GuardedInvocation`] is adapted to the site's shape by the
//! [`TypeConverterFactory`] and installed.
//!
//! # Architecture
//!
//! ```text
//! DynamicLinkerFactory ──create_linker──▶ DynamicLinker
//!                                          ├── LinkerServices
//!                                          │   ├── LinkerChain  (prioritized → discovered → fallback)
//!                                          │   └── TypeConverterFactory  (weak converter cache)
//!                                          └── LinkerConfig / LinkerStats
//!
//! RelinkableCallSite ── invoke ──▶ cached GuardedInvocation (hit)
//!                               └─▶ dispatcher ──▶ chain ──▶ relink / reset (miss)
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

pub mod beans;
pub mod call_site;
pub mod chain;
pub mod config;
pub mod conversion;
pub mod descriptor;
pub mod dynamic_linker;
pub mod error;
pub mod factory;
pub mod guard;
pub mod guarded;
pub mod invocation;
pub mod linker;
pub mod method_type;
pub mod operation;
pub mod registry;
pub mod services;
pub mod stats;

pub use beans::{AccessorPrecedence, BeansLinker, DefaultMissingMemberHandler, MissingMemberHandler};
pub use call_site::{CallSitePhase, DispatcherRef, RelinkDispatcher, RelinkableCallSite, SiteClassification};
pub use chain::LinkerChain;
pub use config::{ConfigError, LinkerConfig};
pub use conversion::TypeConverterFactory;
pub use descriptor::{CallSiteDescriptor, Lookup, SourceLocation};
pub use dynamic_linker::{DynamicLinker, PrelinkTransformer};
pub use error::{InvokeError, InvokeResult, LinkError, LinkResult};
pub use factory::DynamicLinkerFactory;
pub use guard::{Guard, SwitchPoint};
pub use guarded::GuardedInvocation;
pub use invocation::{Invocation, WeakInvocation};
pub use linker::{GuardingDynamicLinker, LinkRequest, LinkerRef};
pub use method_type::MethodType;
pub use operation::{Name, Namespace, Operation, StandardOperation};
pub use registry::{DiscoveryError, LinkerExporter, LinkerRegistry, StaticExporter};
pub use services::{InternalObjectsFilter, LinkerServices};
pub use stats::{LinkerStats, StatsSnapshot};
