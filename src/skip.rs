//! Known-unsupported (type, peer) combinations.
//!
//! Two independent tables: one keyed by broker or intermediary identity and one
//! keyed by client implementation. Both are plain lookups built once at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use amqp_interop_types::AmqpType;

use crate::error::ConfigError;

/// `type -> peer -> reason`.
pub type SkipTable = BTreeMap<AmqpType, BTreeMap<String, String>>;

/// On-disk form of the skip rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRules {
    #[serde(default)]
    pub broker: SkipTable,
    #[serde(default)]
    pub client: SkipTable,
}

/// Which side of a case a skip rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    Broker,
    Sender,
    Receiver,
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PeerRole::Broker => "broker",
            PeerRole::Sender => "sender",
            PeerRole::Receiver => "receiver",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipReason {
    pub ty: AmqpType,
    pub peer: String,
    pub role: PeerRole,
    pub reason: String,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} not supported by {}: {}", self.ty, self.peer, self.reason)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SkipRuleResolver {
    broker: SkipTable,
    client: SkipTable,
}

impl SkipRuleResolver {
    pub fn new(rules: SkipRules) -> Self {
        Self {
            broker: rules.broker,
            client: rules.client,
        }
    }

    /// No rules; nothing is ever skipped.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Known issues in current broker and client releases.
    pub fn amqp_defaults() -> Self {
        Self::new(default_rules())
    }

    /// Load rules from a JSON file of the form `{"broker": {..}, "client": {..}}`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        let rules: SkipRules =
            serde_json::from_str(&text).map_err(|source| ConfigError::ParseFile {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(rules))
    }

    pub fn is_skipped_for_peer(&self, ty: AmqpType, peer: &str) -> bool {
        lookup(&self.broker, ty, peer).is_some()
    }

    pub fn is_skipped_for_implementation(&self, ty: AmqpType, implementation: &str) -> bool {
        lookup(&self.client, ty, implementation).is_some()
    }

    /// Reason a broker rule matched, if any.
    pub fn peer_skip_reason(&self, ty: AmqpType, peer: &str) -> Option<SkipReason> {
        lookup(&self.broker, ty, peer).map(|reason| SkipReason {
            ty,
            peer: peer.to_string(),
            role: PeerRole::Broker,
            reason: reason.to_string(),
        })
    }

    /// Reason a client rule matched, if any. `role` says which side of the
    /// case `implementation` plays.
    pub fn implementation_skip_reason(
        &self,
        ty: AmqpType,
        implementation: &str,
        role: PeerRole,
    ) -> Option<SkipReason> {
        lookup(&self.client, ty, implementation).map(|reason| SkipReason {
            ty,
            peer: implementation.to_string(),
            role,
            reason: reason.to_string(),
        })
    }

    /// First matching rule for a case: broker, then sender, then receiver.
    pub fn resolve(
        &self,
        ty: AmqpType,
        broker: &str,
        sender: &str,
        receiver: &str,
    ) -> Option<SkipReason> {
        self.peer_skip_reason(ty, broker)
            .or_else(|| self.implementation_skip_reason(ty, sender, PeerRole::Sender))
            .or_else(|| self.implementation_skip_reason(ty, receiver, PeerRole::Receiver))
    }
}

fn lookup<'a>(table: &'a SkipTable, ty: AmqpType, peer: &str) -> Option<&'a str> {
    table
        .get(&ty)
        .and_then(|peers| peers.get(peer))
        .map(String::as_str)
}

fn rule_set(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(peer, reason)| (peer.to_string(), reason.to_string()))
        .collect()
}

fn default_rules() -> SkipRules {
    const DECIMAL_REVERSED: &str = "decimal32 and decimal64 sent byte reversed: PROTON-1160";
    const NEG_NAN: &str = "-NaN is stripped of its sign: ENTMQ-1686";
    const NETLITE_DECIMAL: &str =
        "Decimal types not supported: https://github.com/Azure/amqpnetlite/issues/223";

    let mut broker = SkipTable::new();
    broker.insert(
        AmqpType::Decimal32,
        rule_set(&[
            ("ActiveMQ", DECIMAL_REVERSED),
            ("qpid-cpp", "decimal32 not supported on qpid-cpp broker: QPIDIT-5, QPID-6328"),
            ("apache-activemq-artemis", DECIMAL_REVERSED),
            ("qpid-dispatch-router", DECIMAL_REVERSED),
        ]),
    );
    broker.insert(
        AmqpType::Decimal64,
        rule_set(&[
            ("ActiveMQ", DECIMAL_REVERSED),
            ("qpid-cpp", "decimal64 not supported on qpid-cpp broker: QPIDIT-6, QPID-6328"),
            ("apache-activemq-artemis", DECIMAL_REVERSED),
            ("qpid-dispatch-router", DECIMAL_REVERSED),
        ]),
    );
    broker.insert(
        AmqpType::Decimal128,
        rule_set(&[
            ("qpid-cpp", "decimal128 not supported on qpid-cpp broker: QPIDIT-3, QPID-6328"),
            ("qpid-dispatch-router", "router with qpid or activemq broker"),
        ]),
    );
    broker.insert(
        AmqpType::Char,
        rule_set(&[
            ("qpid-cpp", "char not supported on qpid-cpp broker: QPIDIT-4, QPID-6328"),
            (
                "apache-activemq-artemis",
                "char types > 16 bits truncated on Artemis: ENTMQ-1685",
            ),
            ("qpid-dispatch-router", "router with qpid or artemis broker"),
        ]),
    );
    broker.insert(
        AmqpType::Float,
        rule_set(&[("apache-activemq-artemis", NEG_NAN)]),
    );
    broker.insert(
        AmqpType::Double,
        rule_set(&[("apache-activemq-artemis", NEG_NAN)]),
    );

    let mut client = SkipTable::new();
    for ty in [AmqpType::Decimal32, AmqpType::Decimal64, AmqpType::Decimal128] {
        client.insert(ty, rule_set(&[("AmqpNetLite", NETLITE_DECIMAL)]));
    }

    SkipRules { broker, client }
}
