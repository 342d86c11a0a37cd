//! Role authorization and access lists

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use cast_common::config::AccessConfig;
use cast_common::{Address, CommunityId, Error, ListType, Result, Role};
use cast_storage::GovernanceStore;

/// Global allow and block lists
#[derive(Debug, Clone, Default)]
pub struct AccessLists {
    admins: HashSet<Address>,
    blocked: HashSet<Address>,
}

impl AccessLists {
    pub fn new(
        admins: impl IntoIterator<Item = Address>,
        blocked: impl IntoIterator<Item = Address>,
    ) -> Self {
        Self {
            admins: admins.into_iter().collect(),
            blocked: blocked.into_iter().collect(),
        }
    }

    /// Build from configuration, rejecting malformed addresses
    pub fn from_config(config: &AccessConfig) -> Result<Self> {
        let parse = |raw: &Vec<String>| {
            raw.iter()
                .map(|a| Address::parse(a))
                .collect::<Result<Vec<_>>>()
        };
        Ok(Self::new(parse(&config.admin_allowlist)?, parse(&config.blocklist)?))
    }

    pub fn is_global_admin(&self, addr: &Address) -> bool {
        self.admins.contains(addr)
    }

    pub fn is_globally_blocked(&self, addr: &Address) -> bool {
        self.blocked.contains(addr)
    }
}

/// Decides whether an address holds a role in a community
///
/// A block, global or community-scoped, overrides every grant. A global admin
/// satisfies every role requirement. Otherwise the strongest grant in the
/// community is compared with the requirement.
pub struct RoleAuthorizer {
    store: Arc<dyn GovernanceStore>,
    lists: AccessLists,
}

impl RoleAuthorizer {
    pub fn new(store: Arc<dyn GovernanceStore>, lists: AccessLists) -> Self {
        Self { store, lists }
    }

    pub async fn is_blocked(&self, addr: &Address, community_id: CommunityId) -> Result<bool> {
        if self.lists.is_globally_blocked(addr) {
            return Ok(true);
        }
        let list = self
            .store
            .get_community_list(community_id, ListType::Block)
            .await?;
        Ok(list.map_or(false, |l| l.addresses.contains(addr)))
    }

    pub async fn ensure_not_blocked(&self, addr: &Address, community_id: CommunityId) -> Result<()> {
        if self.is_blocked(addr, community_id).await? {
            warn!("Blocked address {} rejected in community {}", addr, community_id);
            return Err(Error::forbidden(format!(
                "address {} is blocked in community {}",
                addr, community_id
            )));
        }
        Ok(())
    }

    /// Succeed iff `addr` may act as `required` in the community
    pub async fn authorize(&self, addr: &Address, community_id: CommunityId, required: Role) -> Result<()> {
        self.ensure_not_blocked(addr, community_id).await?;

        if self.lists.is_global_admin(addr) {
            debug!("{} authorized as global admin", addr);
            return Ok(());
        }

        let roles = self.store.roles_for(community_id, addr).await?;
        if roles.iter().any(|role| role.implies(required)) {
            return Ok(());
        }

        Err(Error::forbidden(format!(
            "{} is not {} in community {}",
            addr, required, community_id
        )))
    }
}
