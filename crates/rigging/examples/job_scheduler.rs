// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Assembles a small job scheduling service out of bundles and extensions.
//!
//! Every team bundle gets its own container with its own scheduler. Schedulers inherit the
//! concurrency limit of the nearest scheduler above them, and each scheduler turns its jobs into a
//! component once its container completes.

use std::fmt::Write as _;
use std::sync::Arc;

use rigging::{
    AncestorScope, Assembler, Assembly, BoxError, Bundle, BundleContext, Component, Declaration, DeclarationError, Extension,
    ExtensionContext, ExtensionRegistry, Runtime, Wirelet,
};
use tracing::{Level, event};

/// Timezone handed to every container of the service.
struct Timezone(&'static str);

/// Service type provided by the clock.
struct SystemClock;

/// Service type provided by each scheduler.
struct JobQueue;

struct Clock {
    timezone: String,
}

impl Extension for Clock {
    const NAME: &'static str = "clock";

    fn new(cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
        let timezone = cx.wirelet::<Timezone>().map_or("UTC", |timezone| timezone.0).to_owned();
        Ok(Self { timezone })
    }

    fn on_complete(&mut self, cx: &mut ExtensionContext<'_>) -> Result<(), BoxError> {
        cx.install(Component::new("clock").provides::<SystemClock>())?;
        Ok(())
    }
}

struct Scheduler {
    jobs: Vec<(String, String)>,
    max_concurrency: usize,
}

impl Scheduler {
    fn schedule(&mut self, name: &str, cron: &str) {
        self.jobs.push((name.to_owned(), cron.to_owned()));
    }
}

impl Extension for Scheduler {
    const NAME: &'static str = "scheduler";

    fn declare(declaration: &mut Declaration) -> Result<(), DeclarationError> {
        declaration.depends_on::<Clock>()?;
        declaration.link_ancestors(AncestorScope::Nearest);
        Ok(())
    }

    fn new(cx: &mut ExtensionContext<'_>) -> Result<Self, BoxError> {
        cx.use_extension::<Clock>()?;
        Ok(Self {
            jobs: Vec::new(),
            max_concurrency: 1,
        })
    }

    fn on_descendant(&mut self, descendant: &mut Self) -> Result<(), BoxError> {
        descendant.max_concurrency = self.max_concurrency;
        Ok(())
    }

    fn on_complete(&mut self, cx: &mut ExtensionContext<'_>) -> Result<(), BoxError> {
        let timezone = cx.dependency::<Clock>().map_or("UTC", |clock| clock.timezone.as_str());

        for (name, cron) in &self.jobs {
            event!(Level::INFO, container = %cx.path(), job = name.as_str(), cron = cron.as_str(), timezone, "job scheduled");
        }

        cx.install(Component::new("scheduler").provides::<JobQueue>().requires::<SystemClock>())?;
        Ok(())
    }
}

struct Billing;

impl Bundle for Billing {
    fn configure(&mut self, cx: &mut BundleContext<'_>) -> Result<(), BoxError> {
        cx.with_extension::<Scheduler, _>(|scheduler, _| {
            scheduler.schedule("invoices", "0 2 * * *");
            scheduler.schedule("dunning", "0 9 * * 1");
        })?;
        Ok(())
    }
}

struct Reports;

impl Bundle for Reports {
    fn configure(&mut self, cx: &mut BundleContext<'_>) -> Result<(), BoxError> {
        cx.with_extension::<Scheduler, _>(|scheduler, _| scheduler.schedule("weekly-digest", "0 6 * * 1"))?;
        Ok(())
    }
}

struct Service;

impl Bundle for Service {
    fn configure(&mut self, cx: &mut BundleContext<'_>) -> Result<(), BoxError> {
        cx.with_extension::<Scheduler, _>(|scheduler, _| scheduler.max_concurrency = 4)?;
        cx.link(Billing)?;
        cx.link(Reports)?;
        Ok(())
    }
}

/// Renders the assembled tree instead of starting anything.
struct Describe;

impl Runtime for Describe {
    type Artifact = String;

    fn launch(&self, assembly: Assembly) -> Result<Self::Artifact, BoxError> {
        let mut out = String::new();

        for container in assembly.containers() {
            let components: Vec<_> = container.components().iter().map(Component::name).collect();
            writeln!(
                out,
                "{}  extensions [{}]  components [{}]",
                container.path(),
                container.extensions().join(", "),
                components.join(", ")
            )?;
        }

        Ok(out)
    }
}

fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).try_init()?;

    let description = Assembler::new(Arc::new(ExtensionRegistry::new()))
        .with_root_name("jobs")
        .with_wirelet(Wirelet::new(Timezone("Europe/Dublin")).propagating())
        .build(Service, &Describe)?;

    print!("{description}");
    Ok(())
}
