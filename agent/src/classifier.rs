//! Request classifier
//!
//! Captures at most one transaction name and one exception per session by
//! watching for configured marker symbols. Runs on every call boundary of an
//! active session, whether or not the call itself is profiled.

use crate::spans::CallContext;
use callspan_shared::Value;

/// Controller dispatch methods whose transaction name is `ReceiverClass::action`
pub const DEFAULT_DISPATCHERS: [&str; 4] = [
    "Zend_Controller_Action::dispatch",
    "Enlight_Controller_Action::dispatch",
    "Mage_Core_Controller_Varien_Action::dispatch",
    "Illuminate\\Routing\\Controller::callAction",
];

#[derive(Debug, Default)]
pub struct Classifier {
    transaction_marker: Option<String>,
    exception_marker: Option<String>,
    dispatchers: Vec<String>,
    transaction_name: Option<String>,
    exception: Option<Value>,
}

impl Classifier {
    pub fn new(
        transaction_marker: Option<String>,
        exception_marker: Option<String>,
        dispatchers: Vec<String>,
    ) -> Self {
        Self {
            transaction_marker: transaction_marker.filter(|s| !s.is_empty()),
            exception_marker: exception_marker.filter(|s| !s.is_empty()),
            dispatchers,
            transaction_name: None,
            exception: None,
        }
    }

    /// Inspect one call.
    ///
    /// The transaction marker is consumed by its first call, whether or not
    /// that call yields a name.
    pub fn observe(&mut self, call: &CallContext<'_>) {
        if self.transaction_marker.as_deref() == Some(call.symbol) {
            self.transaction_name = self.transaction_name_of(call);
            self.transaction_marker = None;
        }

        if self.exception.is_none() && self.exception_marker.as_deref() == Some(call.symbol) {
            self.exception = call.args.iter().find(|v| v.is_exception()).cloned();
        }
    }

    fn transaction_name_of(&self, call: &CallContext<'_>) -> Option<String> {
        let action = call.str_arg(0).ok()?;
        if self.dispatchers.iter().any(|d| d == call.symbol) {
            let class = call.receiver_class().ok()?;
            Some(format!("{}::{}", class, action))
        } else {
            Some(action.to_string())
        }
    }

    pub fn transaction_name(&self) -> Option<&str> {
        self.transaction_name.as_deref()
    }

    pub fn exception(&self) -> Option<&Value> {
        self.exception.as_ref()
    }

    pub fn into_parts(self) -> (Option<String>, Option<Value>) {
        (self.transaction_name, self.exception)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callspan_shared::Object;

    fn classifier(tx: &str, exc: &str) -> Classifier {
        Classifier::new(
            Some(tx.to_string()),
            Some(exc.to_string()),
            DEFAULT_DISPATCHERS.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_generic_transaction_name() {
        let mut c = classifier("Router::route", "");
        c.observe(&CallContext::new("strlen", &[Value::from("x")], None));
        assert_eq!(c.transaction_name(), None);

        c.observe(&CallContext::new("Router::route", &[Value::from("/checkout")], None));
        c.observe(&CallContext::new("Router::route", &[Value::from("/later")], None));
        assert_eq!(c.transaction_name(), Some("/checkout"));
    }

    #[test]
    fn test_marker_consumed_by_first_call() {
        let mut c = classifier("Router::route", "");
        c.observe(&CallContext::new("Router::route", &[Value::Int(3)], None));
        assert_eq!(c.transaction_name(), None);
        c.observe(&CallContext::new("Router::route", &[Value::from("home")], None));
        assert_eq!(c.transaction_name(), None);
    }

    #[test]
    fn test_dispatcher_transaction_name() {
        let marker = "Zend_Controller_Action::dispatch";
        let mut c = classifier(marker, "");
        let receiver = Value::from(Object::new("IndexController"));
        c.observe(&CallContext::new(
            marker,
            &[Value::from("indexAction")],
            Some(&receiver),
        ));
        assert_eq!(c.transaction_name(), Some("IndexController::indexAction"));
    }

    #[test]
    fn test_first_exception_is_kept() {
        let mut c = classifier("", "handleException");
        let first = Value::from(Object::new("RuntimeException").exception());
        let second = Value::from(Object::new("LogicException").exception());

        c.observe(&CallContext::new(
            "handleException",
            &[Value::from("ctx"), first.clone()],
            None,
        ));
        c.observe(&CallContext::new("handleException", &[second], None));
        assert_eq!(c.exception(), Some(&first));
    }

    #[test]
    fn test_plain_objects_are_not_exceptions() {
        let mut c = classifier("", "handleException");
        c.observe(&CallContext::new(
            "handleException",
            &[Value::from(Object::new("Request"))],
            None,
        ));
        assert!(c.exception().is_none());
    }
}
