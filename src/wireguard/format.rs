//! Rendering a tunnel into WireGuard INI text.

use super::{ConfError, TunnelConfig, ALLOWED_IPS, PERSISTENT_KEEPALIVE};

/// Render `config` with the user's DNS and MTU into a two-section INI file.
///
/// Values are interpolated verbatim, so any field carrying a line break is
/// rejected rather than allowed to inject extra keys.
pub fn render(config: &TunnelConfig, dns: &str, mtu: u16) -> Result<String, ConfError> {
    let addresses = config.addresses.join(", ");

    check_line("PrivateKey", &config.private_key)?;
    check_line("PublicKey", &config.public_key)?;
    check_line("Endpoint", &config.endpoint)?;
    check_line("Address", &addresses)?;
    check_line("DNS", dns)?;

    Ok(format!(
        "[Interface]\n\
         PrivateKey = {private_key}\n\
         Address = {addresses}\n\
         DNS = {dns}\n\
         MTU = {mtu}\n\
         \n\
         [Peer]\n\
         PublicKey = {public_key}\n\
         AllowedIPs = {allowed}\n\
         Endpoint = {endpoint}\n\
         PersistentKeepalive = {keepalive}\n",
        private_key = config.private_key,
        addresses = addresses,
        dns = dns,
        mtu = mtu,
        public_key = config.public_key,
        allowed = ALLOWED_IPS,
        endpoint = config.endpoint,
        keepalive = PERSISTENT_KEEPALIVE,
    ))
}

fn check_line(field: &'static str, value: &str) -> Result<(), ConfError> {
    if value.contains('\n') || value.contains('\r') {
        return Err(ConfError::Newline(field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tunnel() -> TunnelConfig {
        TunnelConfig {
            private_key: "gI6EdUSYvn8ugXOt8QQD6Yc+JyK7ubcOOWb8W/WxjOI=".to_string(),
            public_key: "bmXOC+F1FxEMF9dyiK2H5/1SUtzH0JuVo51h2wPfgyo=".to_string(),
            endpoint: "engage.cloudflare.com:2408".to_string(),
            addresses: vec!["10.2.0.2/32".to_string(), "fd01::2/128".to_string()],
        }
    }

    #[test]
    fn test_render_layout() {
        let text = render(&tunnel(), "1.1.1.1, 1.0.0.1", 1280).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "[Interface]",
                "PrivateKey = gI6EdUSYvn8ugXOt8QQD6Yc+JyK7ubcOOWb8W/WxjOI=",
                "Address = 10.2.0.2/32, fd01::2/128",
                "DNS = 1.1.1.1, 1.0.0.1",
                "MTU = 1280",
                "",
                "[Peer]",
                "PublicKey = bmXOC+F1FxEMF9dyiK2H5/1SUtzH0JuVo51h2wPfgyo=",
                "AllowedIPs = 0.0.0.0/0, ::/0",
                "Endpoint = engage.cloudflare.com:2408",
                "PersistentKeepalive = 25",
            ]
        );
    }

    #[test]
    fn test_render_rejects_line_breaks() {
        let err = render(&tunnel(), "1.1.1.1\nPostUp = rm -rf /", 1280).unwrap_err();
        assert_eq!(err, ConfError::Newline("DNS"));

        let mut bad = tunnel();
        bad.endpoint = "host:1\r\n".to_string();
        assert_eq!(render(&bad, "1.1.1.1", 1280).unwrap_err(), ConfError::Newline("Endpoint"));
    }
}
