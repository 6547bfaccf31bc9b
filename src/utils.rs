use std::cmp::Ordering;
use std::path::Path;
use std::time::Duration;

use indicatif::ProgressStyle;
use log::warn;

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {eta_precise} {msg}",
    )
    .expect("invalid progress template")
}

/// Compare two strings the way a human orders file names: digit runs by value
///
/// `view_2.png` < `view_10.png`, `part-9` < `part-10`
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a, b);
    loop {
        match (a.is_empty(), b.is_empty()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
        let (ra, rest_a) = next_run(a);
        let (rb, rest_b) = next_run(b);
        let ord = match (is_digits(ra), is_digits(rb)) {
            (true, true) => cmp_digits(ra, rb),
            _ => ra.cmp(rb),
        };
        if ord != Ordering::Equal {
            return ord;
        }
        a = rest_a;
        b = rest_b;
    }
}

pub fn natural_sort_paths<P: AsRef<Path>>(paths: &mut [P]) {
    paths.sort_by(|a, b| {
        natural_cmp(&a.as_ref().to_string_lossy(), &b.as_ref().to_string_lossy())
    });
}

fn is_digits(s: &str) -> bool {
    s.as_bytes().first().is_some_and(u8::is_ascii_digit)
}

// first run of either digits or non-digits
fn next_run(s: &str) -> (&str, &str) {
    let digit = is_digits(s);
    let end = s
        .char_indices()
        .find(|(_, c)| c.is_ascii_digit() != digit)
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s.split_at(end)
}

fn cmp_digits(a: &str, b: &str) -> Ordering {
    let ta = a.trim_start_matches('0');
    let tb = b.trim_start_matches('0');
    ta.len()
        .cmp(&tb.len())
        .then_with(|| ta.cmp(tb))
        // equal values: fewer leading zeros first
        .then_with(|| a.len().cmp(&b.len()))
}

/// Fixed-delay bounded retry
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, delay: Duration::from_millis(1500) }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or the attempts are used up, returning the last error
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, (u32, E)>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= attempts => return Err((attempt, err)),
                Err(err) => {
                    warn!("{} failed (attempt {}/{}): {}", what, attempt, attempts, err);
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_cmp() {
        let mut names = vec!["out-10.jsonl", "out-2.jsonl", "out-1.jsonl", "out-02.jsonl"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["out-1.jsonl", "out-2.jsonl", "out-02.jsonl", "out-10.jsonl"]);
    }

    #[test]
    fn test_natural_cmp_mixed() {
        assert_eq!(natural_cmp("a", "a1"), Ordering::Less);
        assert_eq!(natural_cmp("chair_9_x", "chair_10"), Ordering::Less);
        assert_eq!(natural_cmp("b", "a100"), Ordering::Greater);
        assert_eq!(natural_cmp("", ""), Ordering::Equal);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let policy = RetryPolicy { max_attempts: 3, delay: Duration::from_millis(1) };
        let mut calls = 0;
        let result: Result<(), _> = policy
            .run("flaky", |_| {
                calls += 1;
                async { Err::<(), _>("nope") }
            })
            .await;
        assert_eq!(result, Err((3, "nope")));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let policy = RetryPolicy { max_attempts: 3, delay: Duration::from_millis(1) };
        let result = policy
            .run("flaky", |attempt| async move {
                if attempt < 2 { Err("not yet") } else { Ok(attempt) }
            })
            .await;
        assert_eq!(result, Ok(2));
    }
}
