//! Demo test class: the greeter, staged under two salutations.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;

use exam_core::domain::{BoxError, Configuration, DeclaredOperation};
use exam_core::impls::{CatalogError, InvocationContext, TestBody, TestCatalog};
use exam_core::ports::TestClass;

use crate::greeter::{Greeter, GreeterListener};

pub const UNIT: &str = "GreeterTest";

const NAMES: [&str; 3] = ["ferris", "exam", "tokio"];

#[derive(Debug, thiserror::Error)]
#[error("expected {expected:?}, greeter produced {actual:?}")]
pub struct GreetingMismatch {
    expected: Vec<String>,
    actual: Vec<String>,
}

pub struct GreeterTest;

impl TestClass for GreeterTest {
    fn name(&self) -> &str {
        UNIT
    }

    fn operations(&self) -> Vec<DeclaredOperation> {
        vec![
            DeclaredOperation::direct(UNIT, "greets"),
            DeclaredOperation::direct(UNIT, "counts"),
            DeclaredOperation::delegating(UNIT, "greets_each", |builder| {
                let variants = NAMES.iter().map(|name| vec![json!(name)]).collect();
                Ok(builder.add_test_variants(UNIT, "greets_each", variants)?)
            }),
        ]
    }

    fn configurations(&self) -> Vec<Configuration> {
        vec![
            Configuration::new("english").with_option("salutation", json!("Hello")),
            Configuration::new("pirate").with_option("salutation", json!("Ahoy")),
        ]
    }
}

fn salutation(ctx: &InvocationContext) -> String {
    ctx.configuration
        .option("salutation")
        .and_then(|v| v.as_str())
        .unwrap_or("Hello")
        .to_string()
}

/// Send `names` through a fresh listener and return what the greeter said.
async fn greet(salutation: &str, names: &[String]) -> Result<(usize, Vec<String>), BoxError> {
    let listener = GreeterListener::new(Greeter::new(salutation));
    let (tx, rx) = mpsc::channel(names.len().max(1));
    for name in names {
        tx.send(name.clone()).await?;
    }
    drop(tx);
    let handled = listener.listen(rx).await;
    Ok((handled, listener.handler().greetings()))
}

fn expect(expected: Vec<String>, actual: Vec<String>) -> Result<(), BoxError> {
    if expected == actual {
        Ok(())
    } else {
        Err(GreetingMismatch { expected, actual }.into())
    }
}

struct Greets;

#[async_trait]
impl TestBody for Greets {
    async fn run(&self, ctx: &InvocationContext) -> Result<(), BoxError> {
        let salutation = salutation(ctx);
        let (_, greetings) = greet(&salutation, &["ferris".to_string()]).await?;
        expect(vec![format!("{salutation}, ferris!")], greetings)
    }
}

struct Counts;

#[async_trait]
impl TestBody for Counts {
    async fn run(&self, ctx: &InvocationContext) -> Result<(), BoxError> {
        let names: Vec<String> = NAMES.iter().map(|n| n.to_string()).collect();
        let (handled, _) = greet(&salutation(ctx), &names).await?;
        if handled != names.len() {
            return Err(format!("handled {handled} of {} messages", names.len()).into());
        }
        Ok(())
    }
}

struct GreetsEach;

#[async_trait]
impl TestBody for GreetsEach {
    async fn run(&self, ctx: &InvocationContext) -> Result<(), BoxError> {
        let name = ctx
            .arguments
            .first()
            .and_then(|v| v.as_str())
            .ok_or("greets_each needs a name argument")?
            .to_string();
        let salutation = salutation(ctx);
        let (_, greetings) = greet(&salutation, std::slice::from_ref(&name)).await?;
        expect(vec![format!("{salutation}, {name}!")], greetings)
    }
}

pub fn catalog() -> Result<TestCatalog, CatalogError> {
    let mut catalog = TestCatalog::new();
    catalog.register(UNIT, "greets", Arc::new(Greets))?;
    catalog.register(UNIT, "counts", Arc::new(Counts))?;
    catalog.register(UNIT, "greets_each", Arc::new(GreetsEach))?;
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::ExamRunner;
    use exam_core::ExamSettings;
    use exam_core::domain::OutcomeKind;
    use exam_core::impls::{CollectingSink, InProcessProvisioner};
    use exam_core::ports::{DeclaredConfigurations, SystemClock, UlidGenerator};

    #[tokio::test]
    async fn demo_class_passes_under_both_salutations() {
        let provisioner = Arc::new(InProcessProvisioner::new(
            Arc::new(catalog().unwrap()),
            Arc::new(UlidGenerator::new(SystemClock)),
        ));
        let runner = ExamRunner::new(provisioner.clone(), ExamSettings::default());

        let report = runner
            .run(&GreeterTest, &DeclaredConfigurations, Arc::new(CollectingSink::new()))
            .await
            .unwrap();

        // (greets + counts + 3 variants) x 2 configurations
        assert_eq!(report.outcomes.len(), 10);
        assert_eq!(report.count(OutcomeKind::Success), 10);
        assert_eq!(provisioner.outstanding().await, 0);
    }

    #[test]
    fn mismatch_names_both_sides() {
        let err = expect(vec!["Hello, a!".into()], vec!["Ahoy, a!".into()]).unwrap_err();
        assert!(err.to_string().contains("Ahoy, a!"));
    }
}
