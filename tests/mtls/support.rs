use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SanType,
};
use serde_json::{json, Value};
use time::{Duration, OffsetDateTime};
use wiremock::matchers::{header, method, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Token the fake backend expects on every issuance call.
pub const SERVICE_TOKEN: &str = "s.service";

/// Certificate authority standing in for the backend's PKI engine.
pub struct TestPki {
    ca: rcgen::Certificate,
    ca_key: KeyPair,
    next_serial: AtomicU64,
    issued: AtomicU64,
}

impl TestPki {
    pub fn new() -> Arc<Self> {
        let ca_key = KeyPair::generate().expect("generate CA key");
        let mut params = CertificateParams::new(Vec::<String>::new()).expect("CA params");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(DnType::CommonName, "courier integration CA");
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let ca = params.self_signed(&ca_key).expect("self-sign CA");

        Arc::new(Self { ca, ca_key, next_serial: AtomicU64::new(0x2000), issued: AtomicU64::new(0) })
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Sign a leaf for the PKI issue request body `request`.
    fn sign(&self, request: &Value) -> Value {
        let common_name = request["common_name"].as_str().unwrap_or_default().to_string();
        let mut dns_names = vec![common_name.clone()];
        dns_names.extend(split_list(&request["alt_names"]));

        let key = KeyPair::generate().expect("generate leaf key");
        let mut params = CertificateParams::new(dns_names).expect("leaf params");
        params.distinguished_name.push(DnType::CommonName, common_name);
        for ip in split_list(&request["ip_sans"]) {
            if let Ok(ip) = ip.parse::<IpAddr>() {
                params.subject_alt_names.push(SanType::IpAddress(ip));
            }
        }
        params.extended_key_usages =
            vec![ExtendedKeyUsagePurpose::ServerAuth, ExtendedKeyUsagePurpose::ClientAuth];
        let now = OffsetDateTime::now_utc();
        params.not_before = now - Duration::days(1);
        params.not_after = now + Duration::hours(1);
        let serial = self.next_serial.fetch_add(1, Ordering::SeqCst);
        params.serial_number = Some(serial.into());

        let cert = params.signed_by(&key, &self.ca, &self.ca_key).expect("sign leaf");
        self.issued.fetch_add(1, Ordering::SeqCst);

        json!({
            "request_id": format!("issue-{serial}"),
            "data": {
                "certificate": cert.pem(),
                "issuing_ca": self.ca.pem(),
                "private_key": key.serialize_pem(),
                "private_key_type": "ec",
                "serial_number": format!("{serial:x}"),
            }
        })
    }
}

fn split_list(value: &Value) -> Vec<String> {
    value
        .as_str()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

struct IssueResponder(Arc<TestPki>);

impl Respond for IssueResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        match serde_json::from_slice::<Value>(&request.body) {
            Ok(body) => ResponseTemplate::new(200).set_body_json(self.0.sign(&body)),
            Err(_) => ResponseTemplate::new(400).set_body_string("invalid issue request"),
        }
    }
}

/// Start a fake backend whose PKI mount signs every issue request with
/// `pki`.
pub async fn start_backend(pki: Arc<TestPki>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/pki/issue/[a-z-]+$"))
        .and(header("X-Vault-Token", SERVICE_TOKEN))
        .respond_with(IssueResponder(pki))
        .mount(&server)
        .await;
    server
}
