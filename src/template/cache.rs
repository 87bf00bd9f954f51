//! Memo table of resolved templates, keyed by template text.

use crate::template::Template;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Thread-safe cache of parsed templates.
///
/// Parsing happens at most once per distinct template text; invalid texts are cached
/// as the default template they resolve to.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: RwLock<HashMap<String, Arc<Template>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the template for `text`, resolving and caching it on first use.
    ///
    /// See [`Template::resolve`] for the fallback rules.
    pub fn get_or_resolve(&self, text: &str) -> Arc<Template> {
        if let Some(template) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(text)
        {
            return Arc::clone(template);
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            entries
                .entry(text.to_string())
                .or_insert_with(|| Arc::new(Template::resolve(Some(text)))),
        )
    }

    /// Number of cached template texts.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::thread;

    #[test]
    fn test_cache_reuses_parsed_template() {
        let cache = TemplateCache::new();
        let first = cache.get_or_resolve("auth + year");
        let second = cache.get_or_resolve("auth + year");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_stores_fallback_for_invalid_text() {
        let cache = TemplateCache::new();
        let template = cache.get_or_resolve("{unknown}");
        assert!(template.is_default());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_shared_across_threads() {
        let cache = Arc::new(TemplateCache::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.get_or_resolve("title.short()").source().to_string())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), "title.short()");
        }
        assert_eq!(cache.len(), 1);
    }
}
