//! DMARC policy record lookup.
//!
//! A small helper around the `_dmarc.<domain>` TXT record (RFC 7489). Only
//! discovery and record decoding are provided; policy evaluation is the
//! caller's business.

use crate::{
    tag_list::{TagList, TagSpec},
    verifier::LookupTxt,
};
use std::{
    fmt::{self, Display, Formatter},
    io::ErrorKind,
    str::FromStr,
    time::Duration,
};
use tracing::trace;

/// A requested message disposition.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Policy {
    #[default]
    None,
    Quarantine,
    Reject,
}

impl FromStr for Policy {
    type Err = DmarcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("none") {
            Ok(Self::None)
        } else if s.eq_ignore_ascii_case("quarantine") {
            Ok(Self::Quarantine)
        } else if s.eq_ignore_ascii_case("reject") {
            Ok(Self::Reject)
        } else {
            Err(DmarcError::RecordSyntax)
        }
    }
}

/// An identifier alignment mode.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AlignmentMode {
    #[default]
    Relaxed,
    Strict,
}

impl FromStr for AlignmentMode {
    type Err = DmarcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("r") {
            Ok(Self::Relaxed)
        } else if s.eq_ignore_ascii_case("s") {
            Ok(Self::Strict)
        } else {
            Err(DmarcError::RecordSyntax)
        }
    }
}

/// A failure reporting option (*fo=*).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureOptions {
    /// `0`: report when all mechanisms fail.
    All,
    /// `1`: report when any mechanism fails.
    Any,
    /// `d`: report on DKIM failure.
    Dkim,
    /// `s`: report on SPF failure.
    Spf,
}

/// A DMARC policy record.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// The policy for the queried domain (*p=*).
    pub policy: Policy,
    /// The policy for subdomains (*sp=*), defaulting to the domain policy.
    pub subdomain_policy: Option<Policy>,
    /// DKIM identifier alignment (*adkim=*).
    pub dkim_alignment: AlignmentMode,
    /// SPF identifier alignment (*aspf=*).
    pub spf_alignment: AlignmentMode,
    /// Sampling rate percentage (*pct=*).
    pub percent: u8,
    /// Aggregate report addresses (*rua=*).
    pub report_uris_aggregate: Vec<String>,
    /// Failure report addresses (*ruf=*).
    pub report_uris_failure: Vec<String>,
    /// Failure reporting options (*fo=*).
    pub failure_options: Vec<FailureOptions>,
    /// Failure report formats (*rf=*).
    pub report_format: Vec<String>,
    /// Interval between aggregate reports (*ri=*).
    pub report_interval: Duration,
}

/// An error that occurs during DMARC record discovery.
#[derive(Debug)]
pub enum DmarcError {
    /// The domain publishes no DMARC record.
    NotFound,
    /// The record is not a well-formed DMARC record.
    RecordSyntax,
    /// The record lookup failed.
    Lookup(std::io::Error),
}

impl DmarcError {
    pub fn is_temp_fail(&self) -> bool {
        matches!(self, Self::Lookup(_))
    }

    pub fn is_perm_fail(&self) -> bool {
        !self.is_temp_fail()
    }
}

impl Display for DmarcError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no DMARC record found"),
            Self::RecordSyntax => write!(f, "ill-formed DMARC record"),
            Self::Lookup(e) => write!(f, "DMARC record lookup failed: {e}"),
        }
    }
}

impl std::error::Error for DmarcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Lookup(e) => Some(e),
            _ => None,
        }
    }
}

/// Looks up and decodes the DMARC record of the given domain.
///
/// Queries the TXT records at `_dmarc.<domain>`; the first record that
/// identifies as `v=DMARC1` is decoded.
pub async fn lookup<T: LookupTxt>(resolver: &T, domain: &str) -> Result<Record, DmarcError> {
    let query_name = format!("_dmarc.{domain}.");

    let txts = resolver.lookup_txt(&query_name).await.map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            DmarcError::NotFound
        } else {
            DmarcError::Lookup(e)
        }
    })?;

    for txt in txts {
        let txt = match txt {
            Ok(txt) => txt,
            Err(e) => {
                trace!("cannot use DNS TXT record: {e}");
                continue;
            }
        };

        let Ok(txt) = String::from_utf8(txt) else {
            continue;
        };

        // only the record identifying as DMARC is of interest
        if txt.trim_start().starts_with("v=DMARC1") {
            return Record::from_str(&txt);
        }
    }

    Err(DmarcError::NotFound)
}

impl FromStr for Record {
    type Err = DmarcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag_list = TagList::from_str(s).map_err(|_| DmarcError::RecordSyntax)?;

        let mut policy = None;
        let mut subdomain_policy = None;
        let mut dkim_alignment = AlignmentMode::default();
        let mut spf_alignment = AlignmentMode::default();
        let mut percent = 100u8;
        let mut report_uris_aggregate = vec![];
        let mut report_uris_failure = vec![];
        let mut failure_options = vec![FailureOptions::All];
        let mut report_format = vec!["afrf".to_owned()];
        let mut report_interval = Duration::from_secs(86400);

        for (i, &TagSpec { name, value }) in tag_list.as_ref().iter().enumerate() {
            match name {
                "v" => {
                    // the v= tag must come first and be DMARC1
                    if i != 0 || value != "DMARC1" {
                        return Err(DmarcError::RecordSyntax);
                    }
                }
                "p" => {
                    policy = Some(value.parse()?);
                }
                "sp" => {
                    subdomain_policy = Some(value.parse()?);
                }
                "adkim" => {
                    dkim_alignment = value.parse()?;
                }
                "aspf" => {
                    spf_alignment = value.parse()?;
                }
                "pct" => {
                    let n: u8 = value.parse().map_err(|_| DmarcError::RecordSyntax)?;
                    if n > 100 {
                        return Err(DmarcError::RecordSyntax);
                    }
                    percent = n;
                }
                "rua" => {
                    report_uris_aggregate =
                        value.split(',').map(|s| s.trim().to_owned()).collect();
                }
                "ruf" => {
                    report_uris_failure =
                        value.split(',').map(|s| s.trim().to_owned()).collect();
                }
                "fo" => {
                    let mut opts = vec![];
                    for o in value.split(':') {
                        match o.trim() {
                            "0" => opts.push(FailureOptions::All),
                            "1" => opts.push(FailureOptions::Any),
                            "d" | "D" => opts.push(FailureOptions::Dkim),
                            "s" | "S" => opts.push(FailureOptions::Spf),
                            _ => return Err(DmarcError::RecordSyntax),
                        }
                    }
                    failure_options = opts;
                }
                "rf" => {
                    report_format = value.split(':').map(|s| s.trim().to_owned()).collect();
                }
                "ri" => {
                    let secs: u64 = value.parse().map_err(|_| DmarcError::RecordSyntax)?;
                    report_interval = Duration::from_secs(secs);
                }
                // unknown tags are ignored
                _ => {}
            }
        }

        let policy = policy.ok_or(DmarcError::RecordSyntax)?;

        Ok(Self {
            policy,
            subdomain_policy,
            dkim_alignment,
            spf_alignment,
            percent,
            report_uris_aggregate,
            report_uris_failure,
            failure_options,
            report_format,
            report_interval,
        })
    }
}
