//! Small utility helpers used across modules.

use std::{future::Future, time::Duration};

use crate::error::ProviderError;

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

/// Log-safe truncation for large strings, cut on a char boundary.
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

/// Run a provider future under a hard deadline; elapsing maps to `ProviderError::Timeout`.
pub async fn bounded<T, F>(deadline: Duration, fut: F) -> Result<T, ProviderError>
where
  F: Future<Output = Result<T, ProviderError>>,
{
  match tokio::time::timeout(deadline, fut).await {
    Ok(res) => res,
    Err(_) => Err(ProviderError::Timeout),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_all_keys() {
    let out = fill_template("{a} y {b} y {a}", &[("a", "Historia"), ("b", "Geografía")]);
    assert_eq!(out, "Historia y Geografía y Historia");
  }

  #[test]
  fn trunc_for_log_respects_char_boundaries() {
    let s = "Hidrografía mundial";
    let out = trunc_for_log(s, 10);
    assert!(out.starts_with("Hidrograf"));
    assert!(out.ends_with(&format!("({} bytes total)", s.len())));
    assert_eq!(trunc_for_log("corto", 10), "corto");
  }

  #[tokio::test]
  async fn bounded_maps_elapsed_deadline_to_timeout() {
    let slow = async {
      tokio::time::sleep(Duration::from_millis(200)).await;
      Ok::<_, ProviderError>(1)
    };
    assert_eq!(bounded(Duration::from_millis(10), slow).await, Err(ProviderError::Timeout));
    let fast = async { Ok::<_, ProviderError>(2) };
    assert_eq!(bounded(Duration::from_secs(1), fast).await, Ok(2));
  }
}
