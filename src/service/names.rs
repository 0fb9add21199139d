//! Cluster DNS names used as certificate subjects.

use std::net::IpAddr;

/// `{name}.{namespace}.svc.{domain}`
pub fn service_domain_name(name: &str, namespace: &str, domain: &str) -> String {
    format!("{}.{}.svc.{}", name, namespace, domain)
}

/// `{ip}.{namespace}.pod.{domain}` with the address in its usual textual
/// form. PKI roles match on this exact subject.
pub fn pod_domain_name(ip: IpAddr, namespace: &str, domain: &str) -> String {
    format!("{}.{}.pod.{}", ip, namespace, domain)
}

/// `{hostname}.{subdomain}.{namespace}.svc.{domain}`, only when both parts
/// are set and non-empty.
pub fn pod_headless_domain_name(
    hostname: Option<&str>,
    subdomain: Option<&str>,
    namespace: &str,
    domain: &str,
) -> Option<String> {
    match (hostname, subdomain) {
        (Some(hostname), Some(subdomain)) if !hostname.is_empty() && !subdomain.is_empty() => {
            Some(format!("{}.{}.{}.svc.{}", hostname, subdomain, namespace, domain))
        }
        _ => None,
    }
}

/// Alternate names for the server certificate: the pod record, the bare
/// service name and, for pods behind a headless service, the stable name.
pub fn server_dns_names(
    service: &str,
    ip: IpAddr,
    hostname: Option<&str>,
    subdomain: Option<&str>,
    namespace: &str,
    domain: &str,
) -> Vec<String> {
    let mut names = vec![pod_domain_name(ip, namespace, domain)];
    if !service.is_empty() {
        names.push(service.to_string());
    }
    names.extend(pod_headless_domain_name(hostname, subdomain, namespace, domain));
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_domain_name() {
        assert_eq!(service_domain_name("web", "prod", "cluster.local"), "web.prod.svc.cluster.local");
    }

    #[test]
    fn test_pod_domain_name_keeps_address_as_written() {
        let v4: IpAddr = "10.0.0.5".parse().unwrap();
        assert_eq!(pod_domain_name(v4, "prod", "cluster.local"), "10.0.0.5.prod.pod.cluster.local");

        let v6: IpAddr = "fd00::5".parse().unwrap();
        assert_eq!(pod_domain_name(v6, "prod", "cluster.local"), "fd00::5.prod.pod.cluster.local");
    }

    #[test]
    fn test_headless_name_needs_both_parts() {
        assert_eq!(pod_headless_domain_name(Some("web-0"), None, "prod", "cluster.local"), None);
        assert_eq!(pod_headless_domain_name(Some(""), Some("web"), "prod", "cluster.local"), None);
        assert_eq!(
            pod_headless_domain_name(Some("web-0"), Some("web"), "prod", "cluster.local").as_deref(),
            Some("web-0.web.prod.svc.cluster.local")
        );
    }

    #[test]
    fn test_server_dns_names_without_headless() {
        let ip: IpAddr = "10.0.0.5".parse().unwrap();
        assert_eq!(
            server_dns_names("web", ip, None, None, "prod", "cluster.local"),
            vec!["10.0.0.5.prod.pod.cluster.local".to_string(), "web".to_string()]
        );
    }
}
