//! Core data model shared across CAST
//!
//! Addresses, communities, proposals and votes, together with the
//! authorization envelopes that travel with a request.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Proposal identifier
pub type ProposalId = u64;
/// Community identifier
pub type CommunityId = u64;
/// Chain block height
pub type BlockHeight = u64;

/// Number of hex digits in a normalized address
const ADDRESS_HEX_LEN: usize = 16;

/// A chain account address, normalized to `0x` followed by 16 lowercase hex digits
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and normalize an address
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim().to_ascii_lowercase();
        let hex = trimmed.strip_prefix("0x").unwrap_or(&trimmed);

        if hex.is_empty() || hex.len() > ADDRESS_HEX_LEN {
            return Err(Error::invalid_request(format!("invalid address length: {}", raw)));
        }
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::invalid_request(format!("invalid address: {}", raw)));
        }

        Ok(Self(format!("0x{:0>width$}", hex, width = ADDRESS_HEX_LEN)))
    }

    /// The normalized string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex digits without the `0x` prefix
    pub fn hex(&self) -> &str {
        &self.0[2..]
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Requested snapshot height for a new proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotHeight {
    /// Resolve to the chain's latest sealed height once, at creation
    #[default]
    Latest,
    /// Pin to an explicit height
    At(BlockHeight),
}

/// Community role, ordered by privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Author,
    Admin,
}

impl Role {
    /// Whether holding `self` satisfies a requirement for `required`
    pub fn implies(self, required: Role) -> bool {
        self >= required
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Author => "author",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "member" => Ok(Role::Member),
            "author" => Ok(Role::Author),
            "admin" => Ok(Role::Admin),
            other => Err(Error::invalid_request(format!("invalid role: {}", other))),
        }
    }
}

/// A (community, address, role) triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleGrant {
    pub community_id: CommunityId,
    pub addr: Address,
    pub role: Role,
}

/// Kind of a community address list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    Allow,
    Block,
}

/// A community-scoped address list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityList {
    pub community_id: CommunityId,
    pub list_type: ListType,
    pub addresses: Vec<Address>,
}

/// Contract parameters a strategy reads balances from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContractParams {
    /// Contract name, e.g. `FlowToken`
    pub name: Option<String>,
    /// Contract account
    pub addr: Option<Address>,
    /// Public capability path of the vault or collection
    pub public_path: Option<String>,
    /// Minimum balance required to vote
    pub threshold: Option<Decimal>,
    /// Upper bound applied to any computed weight
    pub max_weight: Option<Decimal>,
}

impl ContractParams {
    /// Fully qualified contract identifier, e.g. `A.0ae53cb6e3f42a79.FlowToken`
    pub fn identifier(&self) -> String {
        match (&self.addr, &self.name) {
            (Some(addr), Some(name)) => format!("A.{}.{}", addr.hex(), name),
            (None, Some(name)) => name.clone(),
            _ => "FlowToken".to_string(),
        }
    }

    /// Token symbol used in user-facing messages
    pub fn token_name(&self) -> &str {
        self.name.as_deref().unwrap_or("FlowToken")
    }

    pub fn threshold(&self) -> Decimal {
        self.threshold.unwrap_or(Decimal::ZERO)
    }
}

/// A voting strategy as configured by a community
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    /// Strategy key, e.g. `token-weighted-default`
    pub name: String,
    #[serde(default)]
    pub contract: ContractParams,
    /// Script body for `custom-script`
    #[serde(default)]
    pub script: Option<String>,
}

impl StrategyDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contract: ContractParams::default(),
            script: None,
        }
    }

    pub fn with_contract(mut self, contract: ContractParams) -> Self {
        self.contract = contract;
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }
}

/// Community configuration relevant to voting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    pub id: CommunityId,
    pub name: String,
    pub strategies: Vec<StrategyDescriptor>,
    /// Only authors may submit proposals
    pub only_authors_to_submit: bool,
    /// Minimum weight required to submit a proposal when anyone may submit
    pub proposal_threshold: Option<Decimal>,
    /// Strategy used to check `proposal_threshold`; defaults to the first strategy
    pub proposal_validation_strategy: Option<String>,
}

impl Community {
    /// Find a configured strategy by name
    pub fn strategy(&self, name: &str) -> Option<&StrategyDescriptor> {
        self.strategies.iter().find(|s| s.name == name)
    }
}

/// Persisted proposal status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Published,
    Cancelled,
    Closed,
}

impl ProposalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProposalStatus::Published)
    }
}

/// Status derived from the persisted status and the voting window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputedStatus {
    Pending,
    Active,
    Closed,
    Cancelled,
}

/// A governance proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub community_id: CommunityId,
    pub name: String,
    pub body: Option<String>,
    pub choices: Vec<String>,
    /// Strategy frozen at creation time
    pub strategy: StrategyDescriptor,
    pub creator_addr: Address,
    /// Voting opens (unix seconds)
    pub start_time: u64,
    /// Voting closes (unix seconds, exclusive)
    pub end_time: u64,
    pub status: ProposalStatus,
    /// Snapshot height every weight is computed at
    pub block_height: BlockHeight,
    pub achievements_done: bool,
    /// Restricts voting to holders of this role
    pub voter_role: Option<Role>,
    pub created_at: u64,
}

impl Proposal {
    /// Status at `now_secs`
    pub fn computed_status(&self, now_secs: u64) -> ComputedStatus {
        match self.status {
            ProposalStatus::Cancelled => ComputedStatus::Cancelled,
            ProposalStatus::Closed => ComputedStatus::Closed,
            ProposalStatus::Published if now_secs >= self.end_time => ComputedStatus::Closed,
            ProposalStatus::Published if now_secs < self.start_time => ComputedStatus::Pending,
            ProposalStatus::Published => ComputedStatus::Active,
        }
    }

    pub fn is_active(&self, now_secs: u64) -> bool {
        self.computed_status(now_secs) == ComputedStatus::Active
    }

    pub fn has_choice(&self, choice: &str) -> bool {
        self.choices.iter().any(|c| c == choice)
    }
}

/// One signature in a composite signature set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeSignature {
    /// Account that owns the signing key
    pub addr: Address,
    /// Index of the key on the account
    pub key_id: u32,
    /// Hex-encoded signature
    pub signature: String,
}

/// An action a voucher can authorize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum VoucherAction {
    /// Cast a vote on one proposal
    CastVote { proposal_id: ProposalId },
    /// Act with a community role
    ActAs { community_id: CommunityId, role: Role },
}

impl VoucherAction {
    /// Whether a voucher granting `self` authorizes `requested`
    pub fn covers(&self, requested: &VoucherAction) -> bool {
        match (self, requested) {
            (
                VoucherAction::CastVote { proposal_id: granted },
                VoucherAction::CastVote { proposal_id: wanted },
            ) => granted == wanted,
            (
                VoucherAction::ActAs { community_id: granted_community, role: granted_role },
                VoucherAction::ActAs { community_id: wanted_community, role: wanted_role },
            ) => granted_community == wanted_community && granted_role.implies(*wanted_role),
            _ => false,
        }
    }
}

impl fmt::Display for VoucherAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoucherAction::CastVote { proposal_id } => write!(f, "vote:{}", proposal_id),
            VoucherAction::ActAs { community_id, role } => {
                write!(f, "role:{}:{}", community_id, role)
            }
        }
    }
}

/// A delegated-authorization envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voucher {
    /// Account whose keys signed the voucher
    pub signer: Address,
    /// Account the signer acts for
    pub on_behalf_of: Address,
    pub action: VoucherAction,
    /// Milliseconds since epoch
    pub timestamp: u64,
    /// The exact string the signer signed
    pub payload: String,
    pub composite_signatures: Vec<CompositeSignature>,
}

/// Proof that a request originates from an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AuthProof {
    /// Signatures by the claimed account's own keys
    Signatures {
        /// Milliseconds since epoch
        timestamp: u64,
        composite_signatures: Vec<CompositeSignature>,
    },
    /// A voucher signed by a delegate
    Voucher(Voucher),
}

impl AuthProof {
    pub fn timestamp(&self) -> u64 {
        match self {
            AuthProof::Signatures { timestamp, .. } => *timestamp,
            AuthProof::Voucher(voucher) => voucher.timestamp,
        }
    }
}

/// A cast vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub proposal_id: ProposalId,
    pub addr: Address,
    pub choice: String,
    /// Weight captured at cast time
    pub weight: Decimal,
    /// Unix seconds
    pub created_at: u64,
    /// Insertion order assigned by the store
    pub sequence: u64,
    /// The proof the vote was accepted with, kept for audit
    pub proof: AuthProof,
}

/// A vote annotated with a freshly computed weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteWithWeight {
    pub vote: Vote,
    pub current_weight: Decimal,
}

/// Kind of an awarded achievement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AchievementKind {
    WinningVote,
}

/// An achievement awarded when a proposal closes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub addr: Address,
    pub kind: AchievementKind,
    pub proposal_id: ProposalId,
    pub community_id: CommunityId,
    pub details: String,
}

/// Tally results for a proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalResults {
    pub proposal_id: ProposalId,
    /// Aggregate weight per choice
    pub results: BTreeMap<String, Decimal>,
    pub total_weight: Decimal,
    pub vote_count: u64,
    pub updated_at: DateTime<Utc>,
}

impl ProposalResults {
    /// Results as floats, for display
    pub fn results_float(&self) -> BTreeMap<String, f64> {
        use rust_decimal::prelude::ToPrimitive;

        self.results
            .iter()
            .map(|(choice, weight)| (choice.clone(), weight.to_f64().unwrap_or_default()))
            .collect()
    }
}

/// Listing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

impl FromStr for Order {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(Order::Asc),
            "desc" | "" => Ok(Order::Desc),
            other => Err(Error::invalid_request(format!("invalid order: {}", other))),
        }
    }
}

/// Validated pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageParams {
    pub start: u64,
    pub count: u64,
    pub order: Order,
}

impl PageParams {
    pub fn new(start: u64, count: u64, order: Order) -> Self {
        Self { start, count, order }
    }

    /// Clamp raw request values: counts outside `1..=max_count` become
    /// `max_count` and negative starts become zero
    pub fn clamped(start: i64, count: i64, order: Order, max_count: u64) -> Self {
        let count = if count < 1 || count as u64 > max_count {
            max_count
        } else {
            count as u64
        };

        Self {
            start: start.max(0) as u64,
            count,
            order,
        }
    }
}

/// A page of results with the pagination envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub start: u64,
    pub count: u64,
    pub total_records: u64,
    /// Start of the next page, or -1 when this is the last page
    pub next: i64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, params: &PageParams, total_records: u64) -> Self {
        let end = params.start + data.len() as u64;
        let next = if end < total_records { end as i64 } else { -1 };

        Self {
            count: data.len() as u64,
            data,
            start: params.start,
            total_records,
            next,
        }
    }
}
