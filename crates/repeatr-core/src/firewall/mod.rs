// ── Firewall / NAT rule generation ──
//
// `generate` is a pure function of the topology: the same topology always
// yields byte-identical `iptables-restore` text. The text covers the whole
// `nat` and `filter` tables so loading it replaces every rule we own in a
// single transaction.

mod apply;

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::{BridgeMode, Topology};

pub use apply::FirewallApplier;

/// Complete rule text for one topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRuleSet {
    text: String,
    fingerprint: String,
    topology: Topology,
}

impl FirewallRuleSet {
    /// `iptables-restore` input.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Short content hash identifying this rule set.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Individual `-A` rules, table-qualified, for display.
    pub fn rules(&self) -> Vec<RuleLine> {
        let mut table = "";
        let mut out = Vec::new();
        for line in self.text.lines() {
            if let Some(name) = line.strip_prefix('*') {
                table = name;
            } else if let Some(rule) = line.strip_prefix("-A ") {
                let (chain, spec) = rule.split_once(' ').unwrap_or((rule, ""));
                out.push(RuleLine {
                    table: table.to_string(),
                    chain: chain.to_string(),
                    spec: spec.to_string(),
                });
            }
        }
        out
    }
}

/// One appended rule as shown in previews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleLine {
    pub table: String,
    pub chain: String,
    pub spec: String,
}

/// Build the rule set for `topology`.
pub fn generate(topology: &Topology) -> FirewallRuleSet {
    let uplink = topology.uplink.as_str();
    let lan = topology.lan_interface();
    let mut text = String::new();

    let _ = writeln!(
        text,
        "# repeatr: {} mode, uplink forwarding {}",
        topology.bridge_mode,
        if topology.uplink_forwarding { "on" } else { "off" }
    );

    // ── nat ──
    text.push_str("*nat\n");
    for chain in ["PREROUTING", "INPUT", "OUTPUT", "POSTROUTING"] {
        let _ = writeln!(text, ":{chain} ACCEPT [0:0]");
    }
    if topology.uplink_forwarding {
        let _ = writeln!(text, "-A POSTROUTING -o {uplink} -j MASQUERADE");
    }
    text.push_str("COMMIT\n");

    // ── filter ──
    text.push_str("*filter\n");
    text.push_str(":INPUT ACCEPT [0:0]\n:FORWARD DROP [0:0]\n:OUTPUT ACCEPT [0:0]\n");
    text.push_str("-A FORWARD -m conntrack --ctstate RELATED,ESTABLISHED -j ACCEPT\n");

    match topology.bridge_mode {
        BridgeMode::Client => {
            let ethernet = topology.ethernet.as_str();
            if topology.uplink_forwarding {
                push_pair(&mut text, lan, uplink);
                push_pair(&mut text, ethernet, uplink);
            }
            push_pair(&mut text, lan, ethernet);
        }
        BridgeMode::Bridged => {
            if topology.uplink_forwarding {
                push_pair(&mut text, lan, uplink);
            }
            let _ = writeln!(
                text,
                "-A FORWARD -i {lan} -o {lan} -m physdev --physdev-in {} --physdev-is-bridged -j ACCEPT",
                topology.ethernet
            );
        }
    }
    text.push_str("COMMIT\n");

    let fingerprint = fingerprint(&text);
    FirewallRuleSet {
        text,
        fingerprint,
        topology: topology.clone(),
    }
}

fn push_pair(text: &mut String, a: &str, b: &str) {
    let _ = writeln!(text, "-A FORWARD -i {a} -o {b} -j ACCEPT");
    let _ = writeln!(text, "-A FORWARD -i {b} -o {a} -j ACCEPT");
}

fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("{digest:x}").chars().take(16).collect()
}
