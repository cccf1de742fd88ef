//! RFC 7641 Observe: the server-side registry of which tokens are
//! subscribed to which resource, keyed by the resource's canonical URL
//! path (§4.5).
//!
//! Sequence-number ordering for reordered notifications is explicitly a
//! Non-goal (§1); this registry only tracks membership, not delivery order.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use crate::msg::Token;

/// One subscriber: the token it registered with and the address to notify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observer {
  pub token: Token,
  pub addr: SocketAddr,
}

/// Subscriber registry, keyed by a normalized resource path.
pub struct ObserverRegistry {
  resources: Mutex<HashMap<String, Vec<Observer>>>,
}

impl ObserverRegistry {
  pub fn new() -> Self {
    Self { resources: Mutex::new(HashMap::new()) }
  }

  /// Canonicalize a resource path the way §4.5 requires observers to be
  /// keyed: case-insensitive, with surrounding slashes trimmed.
  fn normalize(resource: &str) -> String {
    resource.trim_matches('/').to_ascii_lowercase()
  }

  /// Register `token`/`addr` as observing `resource`. Re-registering the
  /// same token on the same resource replaces its address (a client is
  /// allowed to refresh an Observe registration).
  pub fn register(&self, resource: &str, token: Token, addr: SocketAddr) {
    let key = Self::normalize(resource);
    let mut resources = self.resources.lock().unwrap();
    let observers = resources.entry(key).or_default();
    observers.retain(|o| o.token != token);
    observers.push(Observer { token, addr });
  }

  /// Remove a single observer (a client explicitly canceled, e.g. by
  /// sending a GET without the Observe option, or by RST-ing a
  /// notification).
  pub fn unregister(&self, resource: &str, token: &Token) {
    let key = Self::normalize(resource);
    let mut resources = self.resources.lock().unwrap();
    if let Some(observers) = resources.get_mut(&key) {
      observers.retain(|o| &o.token != token);
      if observers.is_empty() {
        resources.remove(&key);
      }
    }
  }

  /// Remove every observer whose token matches, regardless of resource —
  /// used when a notification is RSTed and the server doesn't know (or
  /// doesn't want to re-derive) which resource the token belongs to.
  pub fn unregister_by_token(&self, token: &Token) {
    let mut resources = self.resources.lock().unwrap();
    resources.retain(|_, observers| {
      observers.retain(|o| &o.token != token);
      !observers.is_empty()
    });
  }

  /// Every current observer of `resource`, in registration order.
  pub fn list(&self, resource: &str) -> Vec<Observer> {
    let key = Self::normalize(resource);
    self.resources.lock().unwrap().get(&key).cloned().unwrap_or_default()
  }

  pub fn resource_count(&self) -> usize {
    self.resources.lock().unwrap().len()
  }
}

impl Default for ObserverRegistry {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn addr() -> SocketAddr {
    "127.0.0.1:5683".parse().unwrap()
  }

  #[test]
  fn register_and_list() {
    let reg = ObserverRegistry::new();
    let tok = Token::new(vec![1]).unwrap();
    reg.register("/time", tok.clone(), addr());
    let observers = reg.list("time");
    assert_eq!(observers.len(), 1);
    assert_eq!(observers[0].token, tok);
  }

  #[test]
  fn resource_keys_are_normalized() {
    let reg = ObserverRegistry::new();
    let tok = Token::new(vec![1]).unwrap();
    reg.register("/Time/", tok.clone(), addr());
    assert_eq!(reg.list("time").len(), 1);
    assert_eq!(reg.list("TIME").len(), 1);
  }

  #[test]
  fn re_registering_same_token_replaces_not_duplicates() {
    let reg = ObserverRegistry::new();
    let tok = Token::new(vec![1]).unwrap();
    reg.register("/time", tok.clone(), addr());
    reg.register("/time", tok.clone(), addr());
    assert_eq!(reg.list("time").len(), 1);
  }

  #[test]
  fn unregister_removes_and_cleans_up_empty_resource() {
    let reg = ObserverRegistry::new();
    let tok = Token::new(vec![1]).unwrap();
    reg.register("/time", tok.clone(), addr());
    reg.unregister("/time", &tok);
    assert!(reg.list("time").is_empty());
    assert_eq!(reg.resource_count(), 0);
  }

  #[test]
  fn unregister_by_token_scans_all_resources() {
    let reg = ObserverRegistry::new();
    let tok = Token::new(vec![9]).unwrap();
    reg.register("/a", tok.clone(), addr());
    reg.register("/b", tok.clone(), addr());
    reg.unregister_by_token(&tok);
    assert!(reg.list("a").is_empty());
    assert!(reg.list("b").is_empty());
  }
}
