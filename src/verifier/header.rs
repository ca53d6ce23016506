// mailseal – DKIM signing and verification for email
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

use crate::{
    crypto::{self, HashAlgorithm, KeyType, VerifyingKey},
    header::HeaderFields,
    record::{DkimKeyRecord, DkimKeyRecordError, SelectorFlag},
    signature::{DkimSignature, DkimSignatureError, DomainName, Identity, DKIM_SIGNATURE_NAME},
    verifier::{
        query::{Queries, QueryResult},
        verify, Config, LookupTxt, VerificationError,
    },
};
use std::{
    io::{self, ErrorKind},
    str::{self, FromStr},
    sync::Arc,
};
use tracing::trace;

/// Progress of one signature verification task. Verification starts with
/// `InProgress` and ends in either `Failed` or `Successful`.
#[derive(Debug, PartialEq)]
pub enum VerifyStatus {
    InProgress,
    Failed(VerificationError),
    Successful,
}

#[derive(Debug, PartialEq)]
pub struct VerifyTask {
    header_name: Option<Box<str>>,
    header_value: Option<Box<str>>,

    pub status: VerifyStatus,
    pub index: usize,
    pub sig: Option<DkimSignature>,
    pub testing: bool,
    pub key_size: Option<usize>,
}

impl VerifyTask {
    fn failed(index: usize, error: VerificationError) -> Self {
        Self {
            header_name: None,
            header_value: None,
            status: VerifyStatus::Failed(error),
            index,
            sig: None,
            testing: false,
            key_size: None,
        }
    }

    fn started(index: usize, sig: DkimSignature, name: Box<str>, value: Box<str>) -> Self {
        Self {
            header_name: Some(name),
            header_value: Some(value),
            status: VerifyStatus::InProgress,
            index,
            sig: Some(sig),
            testing: false,
            key_size: None,
        }
    }
}

pub struct HeaderVerifier<'a, 'b> {
    headers: &'a HeaderFields,
    config: &'b Config,
    pub tasks: Vec<VerifyTask>,
}

impl<'a, 'b> HeaderVerifier<'a, 'b> {
    /// Finds `DKIM-Signature` fields in file order, up to the configured
    /// verification limit, and prepares a task for each. Returns `None` if
    /// there are none at all.
    pub fn find_signatures(headers: &'a HeaderFields, config: &'b Config) -> Option<Self> {
        let mut tasks = vec![];

        let dkim_headers = headers
            .as_ref()
            .iter()
            .enumerate()
            .filter(|(_, (name, _))| *name == DKIM_SIGNATURE_NAME)
            .take(config.max_verifications.unwrap_or(usize::MAX));

        for (index, (name, value)) in dkim_headers {
            let value = match str::from_utf8(value.as_ref()) {
                Ok(s) => s,
                Err(_) => {
                    trace!(index, "invalid UTF-8 in DKIM-Signature header");
                    let error = VerificationError::SignatureFormat(DkimSignatureError::Utf8Encoding);
                    tasks.push(VerifyTask::failed(index, error));
                    continue;
                }
            };

            let sig = match DkimSignature::from_str(value) {
                Ok(sig) => sig,
                Err(e) => {
                    trace!(index, "failed to parse DKIM-Signature header");
                    tasks.push(VerifyTask::failed(index, VerificationError::SignatureFormat(e)));
                    continue;
                }
            };

            if let Err(e) = validate_signature(&sig, index, config) {
                let mut task = VerifyTask::failed(index, e);
                // record the signature, which did parse
                task.sig = Some(sig);
                tasks.push(task);
                continue;
            }

            trace!(index, "found DKIM-Signature header");
            tasks.push(VerifyTask::started(index, sig, name.as_ref().into(), value.into()));
        }

        if tasks.is_empty() {
            None
        } else {
            Some(Self { headers, config, tasks })
        }
    }

    /// Issues the key record queries and performs verification for each task
    /// as its query's results come in.
    pub async fn verify_all<T>(mut self, resolver: &T) -> Vec<VerifyTask>
    where
        T: LookupTxt + Clone + 'static,
    {
        let mut queries = Queries::spawn(&self.tasks, resolver, self.config);

        while let Some(result) = queries.set.join_next().await {
            let (indexes, lookup_result) = match result {
                Ok(r) => r,
                Err(_) => continue,
            };

            let mut records = map_lookup_result_to_key_records(lookup_result);

            // Repeated linear search is fine, the number of tasks is small.
            let selected_tasks = self
                .tasks
                .iter_mut()
                .filter(|t| indexes.contains(&t.index) && t.status == VerifyStatus::InProgress);

            for task in selected_tasks {
                verify_task(task, self.headers, self.config, &mut records);
            }
        }

        self.tasks
    }
}

fn validate_signature(
    sig: &DkimSignature,
    index: usize,
    config: &Config,
) -> Result<(), VerificationError> {
    let current_t = config.current_timestamp();
    let tolerance = config.time_tolerance.as_secs();

    if let Some(x) = sig.expiration {
        if current_t >= x.saturating_add(tolerance) {
            trace!(index, "DKIM-Signature has expired");
            return Err(VerificationError::SignatureExpired);
        }
    }

    if let Some(t) = sig.timestamp {
        if t.saturating_sub(tolerance) > current_t {
            trace!(index, "DKIM-Signature has timestamp in future");
            return Err(VerificationError::TimestampInFuture);
        }
    }

    Ok(())
}

// Parse each TXT string into a `DkimKeyRecord` at most once, even when the
// same lookup serves several signatures.
enum CachedKeyRecord {
    Unparsed(io::Result<String>),
    Parsed(Result<Arc<DkimKeyRecord>, DkimKeyRecordError>),
}

impl CachedKeyRecord {
    fn parse_and_cache(&mut self) -> &Result<Arc<DkimKeyRecord>, DkimKeyRecordError> {
        if let Self::Unparsed(s) = self {
            let r = match s {
                Ok(s) => DkimKeyRecord::from_str(s),
                Err(e) => {
                    // details of the per-record error only reach the trace log
                    trace!("cannot use DNS TXT record: {e}");
                    Err(DkimKeyRecordError::RecordSyntax)
                }
            };
            *self = Self::Parsed(r.map(Arc::new));
        }

        match self {
            Self::Unparsed(_) => unreachable!(),
            Self::Parsed(r) => r,
        }
    }
}

fn map_lookup_result_to_key_records(
    lookup_result: QueryResult,
) -> Result<Vec<CachedKeyRecord>, VerificationError> {
    match lookup_result {
        Ok(txts) if txts.is_empty() => {
            trace!("query found no key records");
            Err(VerificationError::NoKeyFound)
        }
        Ok(txts) => Ok(txts.into_iter().map(CachedKeyRecord::Unparsed).collect()),
        Err(e) => match e.kind() {
            ErrorKind::NotFound => {
                trace!("query found no key records");
                Err(VerificationError::NoKeyFound)
            }
            ErrorKind::InvalidInput => {
                trace!("invalid key record domain name");
                Err(VerificationError::InvalidKeyDomain)
            }
            ErrorKind::TimedOut => {
                trace!("key record lookup timed out");
                Err(VerificationError::KeyLookupTimeout)
            }
            _ => {
                trace!("could not look up key record: {e}");
                Err(VerificationError::KeyLookup)
            }
        },
    }
}

fn verify_task(
    task: &mut VerifyTask,
    headers: &HeaderFields,
    config: &Config,
    lookup_result: &mut Result<Vec<CachedKeyRecord>, VerificationError>,
) {
    let sig = task.sig.as_ref().unwrap();

    let domain = &sig.domain;
    let selector = &sig.selector;

    trace!(%domain, %selector, "processing DKIM-Signature");

    let cached_records = match lookup_result {
        Ok(r) => r,
        Err(e) => {
            task.status = VerifyStatus::Failed(e.clone());
            return;
        }
    };

    let key_type = sig.algorithm.key_type();
    let hash_alg = sig.algorithm.hash_algorithm();

    debug_assert!(!cached_records.is_empty());

    // Step through all (usually just one) key records. The first record that
    // completes verification wins; else the last failure is reported.

    for (i, cached) in cached_records.iter_mut().enumerate() {
        trace!("trying verification using DKIM key record {}", i + 1);

        let key_record = match cached.parse_and_cache() {
            Ok(key_record) => key_record.clone(),
            Err(e) => {
                trace!("unusable DKIM public key record: {e}");
                task.status = VerifyStatus::Failed(VerificationError::KeyRecordFormat(*e));
                continue;
            }
        };

        task.testing = key_record.is_testing();

        if let Err(e) = validate_key_record(
            key_type,
            hash_alg,
            &key_record,
            domain,
            sig.identity.as_ref(),
        ) {
            task.status = VerifyStatus::Failed(e);
            continue;
        }

        let key = match read_verifying_key(key_type, &key_record.key_data, config) {
            Ok(k) => k,
            Err(e) => {
                task.status = VerifyStatus::Failed(e);
                continue;
            }
        };

        task.key_size = key.key_size();

        let name = task.header_name.as_ref().unwrap();
        let value = task.header_value.as_ref().unwrap();

        match verify::perform_verification(headers, &key, sig, name, value) {
            Ok(()) => {
                task.status = VerifyStatus::Successful;
                break;
            }
            Err(e) => {
                task.status = VerifyStatus::Failed(e);
            }
        }
    }
}

fn validate_key_record(
    key_type: KeyType,
    hash_alg: HashAlgorithm,
    record: &DkimKeyRecord,
    domain: &DomainName,
    identity: Option<&Identity>,
) -> Result<(), VerificationError> {
    if record.key_type != key_type {
        trace!("wrong key type in public key record");
        return Err(VerificationError::WrongKeyType);
    }

    if !record.hash_algorithms.contains(&hash_alg) {
        trace!("hash algorithm not allowed by public key record");
        return Err(VerificationError::DisallowedHashAlgorithm);
    }

    if !record.allows_email() {
        trace!("service type not allowed by public key record");
        return Err(VerificationError::DisallowedServiceType);
    }

    if record.flags.contains(&SelectorFlag::NoSubdomains) {
        if let Some(identity) = identity {
            // Signature parsing has ensured the i= domain is a subdomain of
            // the d= domain; the flag requires exact equality.
            if domain.to_ascii() != identity.domain.to_ascii() {
                trace!("i= and d= domains not allowed to differ by public key record");
                return Err(VerificationError::DomainMismatch);
            }
        }
    }

    if !record.granularity_matches(identity.and_then(|i| i.local_part.as_deref())) {
        trace!("i= local-part not within public key record granularity");
        return Err(VerificationError::DisallowedLocalPart);
    }

    Ok(())
}

fn read_verifying_key(
    key_type: KeyType,
    key_data: &[u8],
    config: &Config,
) -> Result<VerifyingKey, VerificationError> {
    let key = VerifyingKey::from_key_data(key_type, key_data).map_err(|e| {
        trace!("unusable key data in public key record: {e}");
        match e {
            crypto::VerificationError::InsufficientKeySize => VerificationError::KeyTooSmall,
            e => VerificationError::VerificationFailure(e),
        }
    })?;

    if let Some(n) = key.key_size() {
        if n < config.min_key_bits {
            trace!("public key size not acceptable due to local policy");
            return Err(VerificationError::KeyTooSmall);
        }
    }

    Ok(key)
}
