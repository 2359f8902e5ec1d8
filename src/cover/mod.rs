//! The coverage registry.
//!
//! Instrumented binaries register their coverage endpoint with a registry
//! server; operators talk to the registry through [`client::HttpClient`] to
//! fetch or reset coverage of every registered instance.

pub mod client;
pub mod profile;
pub mod server;
pub mod store;

use serde::{Deserialize, Serialize};

pub use client::{Action, ClientError, HttpClient};
pub use profile::{merge_profiles, Profile, ProfileError};
pub use server::{create_router, start_server, ServerState};
pub use store::{MemoryStore, ServiceMap, ServiceUnderTest, Store, StoreError};

/// Start a new collection round.
pub const COVER_INIT_SYSTEM_API: &str = "/v1/cover/init";
/// Profile of the selected instances.
pub const COVER_PROFILE_API: &str = "/v1/cover/profile";
/// Reset the counters of the selected instances.
pub const COVER_PROFILE_CLEAR_API: &str = "/v1/cover/clear";
/// All registered services.
pub const COVER_SERVICES_LIST_API: &str = "/v1/cover/list";
/// Register an instance.
pub const COVER_REGISTER_SERVICE_API: &str = "/v1/cover/register";
/// Deregister instances.
pub const COVER_SERVICES_REMOVE_API: &str = "/v1/cover/remove";

/// Instance selection carried by profile, clear and remove requests.
///
/// Selecting by service name and by address are mutually exclusive. An
/// empty selection means every registered instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileParam {
    /// Skip instances that cannot be reached instead of failing.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub force: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub service: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<String>,
}

impl ProfileParam {
    pub fn is_ambiguous(&self) -> bool {
        !self.service.is_empty() && !self.address.is_empty()
    }
}
