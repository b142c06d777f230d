use std::time::{Duration, Instant};

use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::rr::{RData, RecordType};
use tracing::warn;

use super::DnsAnswer;
use crate::error::{ErrorKind, ProbeError};

/// Record types queried to emulate `ANY`
const ANY_RECORD_TYPES: [RecordType; 6] = [
    RecordType::A,
    RecordType::AAAA,
    RecordType::CNAME,
    RecordType::MX,
    RecordType::TXT,
    RecordType::NS,
];

pub struct DnsProbe {
    resolver: TokioAsyncResolver,
}

impl DnsProbe {
    /// Use the host's resolver configuration, or public defaults when it cannot be read
    pub fn from_system() -> Self {
        let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => resolver,
            Err(err) => {
                warn!("Could not read system resolver config, using defaults: {}", err);
                TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
            }
        };
        Self { resolver }
    }

    pub async fn lookup(&self, host: &str, record_type: &str, timeout: Duration) -> Result<DnsAnswer, ProbeError> {
        let start = Instant::now();

        let types: Vec<RecordType> = if record_type.eq_ignore_ascii_case("ANY") {
            ANY_RECORD_TYPES.to_vec()
        } else {
            let parsed = record_type
                .to_ascii_uppercase()
                .parse::<RecordType>()
                .map_err(|e| ProbeError::new(ErrorKind::Other, format!("unsupported record type {record_type}: {e}")))?;
            vec![parsed]
        };

        let mut records = Vec::new();
        for wanted in types {
            let remaining = timeout.saturating_sub(start.elapsed());
            let lookup = match tokio::time::timeout(remaining, self.resolver.lookup(host, wanted)).await {
                Err(_) => return Err(ProbeError::timeout(format!("DNS lookup for {host} exceeded {}ms", timeout.as_millis()))),
                Ok(Ok(lookup)) => lookup,
                Ok(Err(err)) => match err.kind() {
                    ResolveErrorKind::NoRecordsFound { .. } => continue,
                    ResolveErrorKind::Timeout => return Err(ProbeError::timeout(err.to_string())),
                    _ => return Err(ProbeError::new(ErrorKind::DnsFailure, err.to_string())),
                },
            };

            records.extend(lookup.iter().filter(|data| data.record_type() == wanted).map(render));
        }

        Ok(DnsAnswer { records, latency_ms: start.elapsed().as_millis() as u64 })
    }
}

fn render(data: &RData) -> String {
    match data {
        RData::MX(mx) => mx.exchange().to_string(),
        other => other.to_string(),
    }
}
