//! The value shape that flows through the dependency graph.
//!
//! A [`Value`] is what a producer returns: a scalar, an ordered sequence
//! (whose elements may themselves be deferred, one level deep), or a
//! deferred computation. Splicing (see `injector::Injector::produce`) folds
//! a `Value` down into a [`Concrete`] — the only shape that may cross a
//! dependency boundary or sit in the singleton cache, since futures cannot
//! be cloned or replayed.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A raw producer result: possibly still pending.
pub enum Value {
    Scalar(String),
    Seq(Vec<Value>),
    Deferred(BoxFuture<'static, Result<Value>>),
}

impl Value {
    pub fn scalar(s: impl Into<String>) -> Self {
        Value::Scalar(s.into())
    }

    pub fn seq(items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Value::Seq(items.into_iter().map(|s| Value::Scalar(s.into())).collect())
    }

    pub fn deferred<F>(fut: F) -> Self
    where
        F: Future<Output = Result<Value>> + Send + 'static,
    {
        Value::Deferred(Box::pin(fut))
    }
}

/// A fully resolved value: no pending computations left anywhere in it.
///
/// This is what lives in the singleton cache and what gets fed to a
/// dependent producer's parameter map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Concrete {
    Scalar(String),
    Seq(Vec<Concrete>),
}

impl Concrete {
    /// Flatten nested sequences into their leaf scalars, in order.
    /// Mirrors the recursive `flat_map` used throughout the recipe wrapper
    /// to turn target/check/temp role arguments into flat path lists.
    pub fn flatten(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<String>) {
        match self {
            Concrete::Scalar(s) => out.push(s.clone()),
            Concrete::Seq(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Concrete::Scalar(s) => Some(s.as_str()),
            Concrete::Seq(_) => None,
        }
    }
}

/// Recursively await every deferred computation reachable from `value`,
/// substituting its result back into position. A `Seq` is scanned once and
/// its elements awaited concurrently; a nested `Seq` produced by a
/// deferred element is resolved in turn, so depth is not actually bounded.
pub fn splice(value: Value) -> BoxFuture<'static, Result<Concrete>> {
    Box::pin(async move {
        match value {
            Value::Scalar(s) => Ok(Concrete::Scalar(s)),
            Value::Deferred(fut) => {
                let resolved = fut.await?;
                splice(resolved).await
            }
            Value::Seq(items) => {
                let futures = items.into_iter().map(splice);
                let resolved = futures_util::future::try_join_all(futures).await?;
                Ok(Concrete::Seq(resolved))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn splices_scalar() {
        let v = Value::scalar("a.out");
        let c = splice(v).await.unwrap();
        assert_eq!(c, Concrete::Scalar("a.out".into()));
    }

    #[tokio::test]
    async fn splices_seq_with_deferred_elements() {
        let v = Value::Seq(vec![
            Value::scalar("a.o"),
            Value::deferred(async { Ok(Value::scalar("b.o")) }),
        ]);
        let c = splice(v).await.unwrap();
        assert_eq!(
            c,
            Concrete::Seq(vec![
                Concrete::Scalar("a.o".into()),
                Concrete::Scalar("b.o".into())
            ])
        );
        assert_eq!(c.flatten(), vec!["a.o".to_string(), "b.o".to_string()]);
    }

    #[tokio::test]
    async fn flattens_nested_sequences() {
        let c = Concrete::Seq(vec![
            Concrete::Scalar("x".into()),
            Concrete::Seq(vec![Concrete::Scalar("y".into()), Concrete::Scalar("z".into())]),
        ]);
        assert_eq!(c.flatten(), vec!["x".to_string(), "y".to_string(), "z".to_string()]);
    }
}
