use crate::{
    signature::{DomainName, Selector},
    verifier::{
        header::{VerifyStatus, VerifyTask},
        Config, LookupTxt,
    },
};
use std::{
    collections::HashMap,
    io::{self, ErrorKind},
};
use tokio::{task::JoinSet, time};

pub type QueryResult = io::Result<Vec<io::Result<String>>>;

struct QueriesBuilder {
    // A-label form (domain, selector), mapped to the signature header indexes
    // awaiting that key. Shared queries are issued only once.
    lookup_pairs: HashMap<(String, String), Vec<usize>>,
}

impl QueriesBuilder {
    fn new() -> Self {
        Self {
            lookup_pairs: HashMap::new(),
        }
    }

    fn add_lookup(&mut self, domain: &DomainName, selector: &Selector, index: usize) {
        let domain = domain.to_ascii();
        let selector = selector.to_ascii();

        self.lookup_pairs
            .entry((domain, selector))
            .or_default()
            .push(index);
    }

    fn spawn_all<T>(self, resolver: &T, config: &Config) -> Queries
    where
        T: LookupTxt + Clone + 'static,
    {
        let mut set = JoinSet::new();

        for ((domain, selector), indexes) in self.lookup_pairs {
            let resolver = resolver.clone();

            let lookup_timeout = config.lookup_timeout;

            set.spawn(async move {
                let result = match time::timeout(
                    lookup_timeout,
                    look_up_records(&resolver, &domain, &selector),
                )
                .await
                {
                    Ok(r) => r,
                    Err(e) => Err(e.into()),
                };

                (indexes, result)
            });
        }

        Queries { set }
    }
}

async fn look_up_records<T: LookupTxt + ?Sized>(
    resolver: &T,
    domain: &str,
    selector: &str,
) -> QueryResult {
    let query_name = format!("{selector}._domainkey.{domain}.");

    let txts = resolver.lookup_txt(&query_name).await?;

    // §6.1.2: with multiple key records the verifier may try each in turn;
    // their order is unspecified. At most three are considered.
    let result = txts
        .into_iter()
        .take(3)
        .map(|txt| {
            txt.and_then(|s| String::from_utf8(s).map_err(|_| ErrorKind::InvalidData.into()))
        })
        .collect();

    Ok(result)
}

pub struct Queries {
    pub set: JoinSet<(Vec<usize>, QueryResult)>,
}

impl Queries {
    pub fn spawn<T>(tasks: &[VerifyTask], resolver: &T, config: &Config) -> Self
    where
        T: LookupTxt + Clone + 'static,
    {
        let mut builder = QueriesBuilder::new();

        for task in tasks {
            // only tasks that passed the header checks need a key record
            if task.status == VerifyStatus::InProgress {
                if let Some(sig) = &task.sig {
                    builder.add_lookup(&sig.domain, &sig.selector, task.index);
                }
            }
        }

        builder.spawn_all(resolver, config)
    }
}
