//! Trigger-based handler selection.
//!
//! Computes the applicable handler set for a search term. Handlers
//! whose trigger prefixes match run exclusively; with no trigger match
//! the query falls back to the untriggered Batch handlers. Realtime
//! handlers only ever run through a trigger match.

use std::sync::Arc;

use crate::handler::QueryHandler;
use crate::types::ExecutionClass;

/// Computes the set of handlers applicable to `term`.
///
/// The *triggered set* contains every handler with at least one
/// trigger that is a prefix of `term`. A handler with multiple
/// matching triggers is still included once. If the triggered set is
/// non-empty it is the applicable set, exclusively; this is the only
/// path by which a Realtime handler is ever scheduled. Otherwise the
/// applicable set is every Batch handler that declares no trigger;
/// Realtime handlers are skipped entirely in this branch.
pub fn applicable_handlers(
    term: &str,
    handlers: &[Arc<dyn QueryHandler>],
) -> Vec<Arc<dyn QueryHandler>> {
    let triggered: Vec<Arc<dyn QueryHandler>> = handlers
        .iter()
        .filter(|h| h.triggers().iter().any(|t| term.starts_with(t.as_str())))
        .cloned()
        .collect();

    if !triggered.is_empty() {
        return triggered;
    }

    handlers
        .iter()
        .filter(|h| h.triggers().is_empty() && h.execution_class() == ExecutionClass::Batch)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::QueryContext;
    use crate::error::Result;

    struct StubHandler {
        id: String,
        triggers: Vec<String>,
        class: ExecutionClass,
    }

    impl StubHandler {
        fn arc(id: &str, triggers: &[&str], class: ExecutionClass) -> Arc<dyn QueryHandler> {
            Arc::new(Self {
                id: id.into(),
                triggers: triggers.iter().map(|t| t.to_string()).collect(),
                class,
            })
        }
    }

    impl QueryHandler for StubHandler {
        fn id(&self) -> &str {
            &self.id
        }
        fn triggers(&self) -> Vec<String> {
            self.triggers.clone()
        }
        fn execution_class(&self) -> ExecutionClass {
            self.class
        }
        fn handle_query(&self, _query: &QueryContext) -> Result<()> {
            Ok(())
        }
    }

    fn ids(handlers: &[Arc<dyn QueryHandler>]) -> Vec<&str> {
        handlers.iter().map(|h| h.id()).collect()
    }

    fn fixture() -> Vec<Arc<dyn QueryHandler>> {
        vec![
            StubHandler::arc("apps", &[], ExecutionClass::Batch),
            StubHandler::arc("files", &["~", "/"], ExecutionClass::Batch),
            StubHandler::arc("websearch", &["?"], ExecutionClass::Realtime),
            StubHandler::arc("calc", &["="], ExecutionClass::Batch),
            StubHandler::arc("chat", &[], ExecutionClass::Realtime),
        ]
    }

    #[test]
    fn trigger_match_runs_exclusively() {
        let handlers = fixture();
        let applicable = applicable_handlers("?rust async", &handlers);
        assert_eq!(ids(&applicable), vec!["websearch"]);
    }

    #[test]
    fn no_trigger_match_falls_back_to_untriggered_batch() {
        let handlers = fixture();
        let applicable = applicable_handlers("hello", &handlers);
        // Only the untriggered Batch handler; the untriggered Realtime
        // handler never runs.
        assert_eq!(ids(&applicable), vec!["apps"]);
    }

    #[test]
    fn untriggered_realtime_never_scheduled() {
        let handlers = vec![StubHandler::arc("chat", &[], ExecutionClass::Realtime)];
        assert!(applicable_handlers("anything", &handlers).is_empty());
        assert!(applicable_handlers("", &handlers).is_empty());
    }

    #[test]
    fn multiple_matching_triggers_run_handler_once() {
        let handlers = vec![StubHandler::arc(
            "files",
            &["/", "/home"],
            ExecutionClass::Batch,
        )];
        let applicable = applicable_handlers("/home/user", &handlers);
        assert_eq!(applicable.len(), 1);
        assert_eq!(applicable[0].id(), "files");
    }

    #[test]
    fn multiple_handlers_can_trigger_together() {
        let handlers = vec![
            StubHandler::arc("files", &["/"], ExecutionClass::Batch),
            StubHandler::arc("recent", &["/"], ExecutionClass::Realtime),
            StubHandler::arc("apps", &[], ExecutionClass::Batch),
        ];
        let applicable = applicable_handlers("/etc", &handlers);
        assert_eq!(ids(&applicable), vec!["files", "recent"]);
    }

    #[test]
    fn trigger_must_be_prefix_not_substring() {
        let handlers = vec![StubHandler::arc("calc", &["="], ExecutionClass::Batch)];
        assert!(applicable_handlers("1+1=", &handlers).is_empty());
        assert_eq!(applicable_handlers("=1+1", &handlers).len(), 1);
    }

    #[test]
    fn empty_term_selects_untriggered_batch() {
        let handlers = fixture();
        let applicable = applicable_handlers("", &handlers);
        assert_eq!(ids(&applicable), vec!["apps"]);
    }

    #[test]
    fn triggered_batch_excludes_untriggered_batch() {
        let handlers = fixture();
        let applicable = applicable_handlers("=2*21", &handlers);
        assert_eq!(ids(&applicable), vec!["calc"]);
    }
}
