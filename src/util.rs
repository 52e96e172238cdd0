//! Small utility helpers used across modules.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Rough characters-per-token ratio used for budget estimates.
pub const CHARS_PER_TOKEN: usize = 4;

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

/// Estimated token cost of a piece of text. Never zero, so every turn costs something.
pub fn estimate_tokens(text: &str) -> i64 {
  text.chars().count().div_ceil(CHARS_PER_TOKEN).max(1) as i64
}

/// Keep at most `tokens` worth of leading characters.
pub fn truncate_to_tokens(text: &str, tokens: i64) -> String {
  let keep = (tokens.max(0) as usize) * CHARS_PER_TOKEN;
  text.chars().take(keep).collect()
}

const LOCK_MAP_COMPACT_AT: usize = 1024;

/// One async mutex per key. Holders of different keys never wait on each other.
pub struct KeyedLocks<K> {
  inner: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
  pub fn new() -> Self {
    Self { inner: Mutex::new(HashMap::new()) }
  }

  pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
    let slot = {
      let mut map = self.inner.lock().await;
      if map.len() >= LOCK_MAP_COMPACT_AT {
        map.retain(|_, m| Arc::strong_count(m) > 1);
      }
      map.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    };
    slot.lock_owned().await
  }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn token_estimate_rounds_up_and_never_hits_zero() {
    assert_eq!(estimate_tokens(""), 1);
    assert_eq!(estimate_tokens("abcd"), 1);
    assert_eq!(estimate_tokens("abcde"), 2);
    assert_eq!(truncate_to_tokens("abcdefghij", 2), "abcdefgh");
  }

  #[test]
  fn trunc_for_log_respects_char_boundaries() {
    let s = "ééééé";
    let out = trunc_for_log(s, 3);
    assert!(out.starts_with('é'));
    assert!(out.contains("10 bytes total"));
  }

  #[test]
  fn fill_template_replaces_all_keys() {
    let out = fill_template("scope={scope}, again {scope}", &[("scope", "core")]);
    assert_eq!(out, "scope=core, again core");
  }

  #[tokio::test]
  async fn keyed_locks_serialize_same_key() {
    let locks = Arc::new(KeyedLocks::<String>::new());
    let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..8 {
      let locks = locks.clone();
      let counter = counter.clone();
      handles.push(tokio::spawn(async move {
        let _g = locks.lock("k".to_string()).await;
        let before = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        tokio::task::yield_now().await;
        let after = counter.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        assert_eq!(before + 1, after);
      }));
    }
    for h in handles {
      h.await.unwrap();
    }
  }
}
