// ── Daemon configuration rendering ──
//
// hostapd and dnsmasq are configured from scratch on every write; the files
// are owned by repeatr and never patched in place.

use std::fmt::Write as _;

use secrecy::ExposeSecret;

use crate::config::RouterConfig;
use crate::model::{BridgeMode, Topology};

const HEADER: &str = "# Managed by repeatr. Local edits are overwritten.\n";

/// Render `hostapd.conf` for the access-point radio.
///
/// In bridged mode hostapd attaches the radio to the bridge itself.
pub fn render_hostapd(config: &RouterConfig, topology: &Topology) -> String {
    let ap = &config.access_point;
    let mut out = String::from(HEADER);

    let _ = writeln!(out, "interface={}", topology.access_point);
    if topology.bridge_mode == BridgeMode::Bridged {
        let _ = writeln!(out, "bridge={}", topology.bridge);
    }
    out.push_str("driver=nl80211\n");
    let _ = writeln!(out, "ssid={}", ap.ssid);
    let _ = writeln!(out, "hw_mode={}", ap.band.hw_mode());
    let _ = writeln!(out, "channel={}", ap.channel);
    let _ = writeln!(out, "country_code={}", config.regulatory_domain);
    out.push_str("ieee80211d=1\nwmm_enabled=1\nauth_algs=1\n");
    out.push_str("wpa=2\nwpa_key_mgmt=WPA-PSK\nrsn_pairwise=CCMP\n");
    let _ = writeln!(out, "wpa_passphrase={}", ap.passphrase.expose_secret());
    let _ = writeln!(out, "ignore_broadcast_ssid={}", u8::from(ap.hidden));
    out
}

/// Render the dnsmasq drop-in serving DHCP on the LAN side.
///
/// In client mode the routed Ethernet segment gets its own tagged range
/// and gateway next to the access point's.
pub fn render_dnsmasq(config: &RouterConfig, topology: &Topology) -> String {
    let dhcp = &config.dhcp;
    let router = config.access_point.address.addr();
    let mut out = String::from(HEADER);

    let ethernet_range = match topology.bridge_mode {
        BridgeMode::Client => config.ethernet_dhcp_range(),
        BridgeMode::Bridged => None,
    };

    match ethernet_range {
        None => {
            let _ = writeln!(out, "interface={}", topology.lan_interface());
            out.push_str("bind-interfaces\n");
            let _ = writeln!(
                out,
                "dhcp-range={},{},{}",
                dhcp.range_start, dhcp.range_end, dhcp.lease_time
            );
            let _ = writeln!(out, "dhcp-option=3,{router}");
            let _ = writeln!(out, "dhcp-option=6,{router}");
        }
        Some((start, end)) => {
            let eth_router = config.ethernet.address.addr();
            let _ = writeln!(out, "interface={}", topology.access_point);
            let _ = writeln!(out, "interface={}", topology.ethernet);
            // The Ethernet port may be unplugged or absent at boot.
            out.push_str("bind-dynamic\n");
            let _ = writeln!(
                out,
                "dhcp-range=set:ap,{},{},{}",
                dhcp.range_start, dhcp.range_end, dhcp.lease_time
            );
            let _ = writeln!(out, "dhcp-option=tag:ap,3,{router}");
            let _ = writeln!(out, "dhcp-option=tag:ap,6,{router}");
            let _ = writeln!(out, "dhcp-range=set:eth,{start},{end},{}", dhcp.lease_time);
            let _ = writeln!(out, "dhcp-option=tag:eth,3,{eth_router}");
            let _ = writeln!(out, "dhcp-option=tag:eth,6,{eth_router}");
        }
    }
    let _ = writeln!(out, "port={}", dhcp.dns_port);
    let _ = writeln!(out, "domain={}", dhcp.domain);
    out.push_str("expand-hosts\n");
    out
}
