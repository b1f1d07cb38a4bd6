use std::{collections::HashMap, sync::Arc};

use crate::{errors::Error, handler::Handler, Result};

const WILDCARD: char = '*';

/// Button payload -> handler.
///
/// Keys ending in `*` (`"doc:*"`) match every payload that starts with the
/// part before the star. Exact keys are tried first. Wildcard prefixes are
/// checked for overlap at build time, so at most one can ever match.
pub struct CallbackTable {
    exact: HashMap<String, Arc<dyn Handler>>,
    wildcards: Vec<(String, Arc<dyn Handler>)>,
}

impl CallbackTable {
    pub fn builder() -> CallbackTableBuilder {
        CallbackTableBuilder::default()
    }

    pub fn resolve(&self, payload: &str) -> Option<Arc<dyn Handler>> {
        if let Some(h) = self.exact.get(payload) {
            return Some(Arc::clone(h));
        }
        self.wildcards
            .iter()
            .find(|(prefix, _)| payload.starts_with(prefix.as_str()))
            .map(|(_, h)| Arc::clone(h))
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.wildcards.iter().map(|(p, _)| p.as_str())
    }
}

#[derive(Default)]
pub struct CallbackTableBuilder {
    routes: HashMap<String, Arc<dyn Handler>>,
}

impl CallbackTableBuilder {
    pub fn route(mut self, key: &str, handler: Arc<dyn Handler>) -> Self {
        self.routes.insert(key.to_string(), handler);
        self
    }

    pub fn build(self) -> Result<CallbackTable> {
        let mut exact = HashMap::new();
        let mut wildcards: Vec<(String, Arc<dyn Handler>)> = Vec::new();

        for (key, handler) in self.routes {
            match key.strip_suffix(WILDCARD) {
                Some("") => {
                    return Err(Error::Routing(
                        "bare `*` callback route would shadow every prefix".to_string(),
                    ))
                }
                Some(prefix) => wildcards.push((prefix.to_string(), handler)),
                None => {
                    exact.insert(key, handler);
                }
            }
        }

        for (i, (a, _)) in wildcards.iter().enumerate() {
            for (b, _) in wildcards.iter().skip(i + 1) {
                if a.starts_with(b.as_str()) || b.starts_with(a.as_str()) {
                    return Err(Error::Routing(format!(
                        "callback prefixes {a:?} and {b:?} overlap"
                    )));
                }
            }
        }
        wildcards.sort_by(|(a, _), (b, _)| a.cmp(b));

        Ok(CallbackTable { exact, wildcards })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Named;

    #[test]
    fn wildcard_matches_by_prefix() {
        let docs = Named::arc("docs");
        let table = CallbackTable::builder()
            .route("doc:*", docs.clone())
            .route("doc_admin:*", Named::arc("admin"))
            .build()
            .unwrap();

        assert!(Arc::ptr_eq(&table.resolve("doc:certificate").unwrap(), &docs));
        assert!(!Arc::ptr_eq(&table.resolve("doc_admin:view:3").unwrap(), &docs));
        assert!(table.resolve("book:1").is_none());
    }

    #[test]
    fn exact_beats_wildcard() {
        let exact = Named::arc("exact");
        let table = CallbackTable::builder()
            .route("reminder:*", Named::arc("wild"))
            .route("reminder:list", exact.clone())
            .build()
            .unwrap();
        assert!(Arc::ptr_eq(&table.resolve("reminder:list").unwrap(), &exact));
    }

    #[test]
    fn overlapping_prefixes_are_rejected() {
        let err = CallbackTable::builder()
            .route("doc:*", Named::arc("a"))
            .route("doc:admin:*", Named::arc("b"))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Routing(_)));
    }

    #[test]
    fn bare_star_is_rejected() {
        assert!(CallbackTable::builder()
            .route("*", Named::arc("all"))
            .build()
            .is_err());
    }
}
