use actix_web::dev::ServiceRequest;

/// Throttle key for a request: first `X-Forwarded-For` hop when the proxy is
/// trusted, otherwise the peer address.
pub fn get_client_ip(req: &ServiceRequest, trust_x_forwarded_for: bool) -> String {
    if trust_x_forwarded_for {
        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn uses_peer_address_by_default() {
        let req = TestRequest::default()
            .peer_addr("10.0.0.7:5000".parse().unwrap())
            .insert_header(("x-forwarded-for", "1.1.1.1"))
            .to_srv_request();
        assert_eq!(get_client_ip(&req, false), "10.0.0.7");
    }

    #[test]
    fn trusts_first_forwarded_hop() {
        let req = TestRequest::default()
            .peer_addr("10.0.0.7:5000".parse().unwrap())
            .insert_header(("x-forwarded-for", "203.0.113.9, 10.0.0.1"))
            .to_srv_request();
        assert_eq!(get_client_ip(&req, true), "203.0.113.9");
    }
}
