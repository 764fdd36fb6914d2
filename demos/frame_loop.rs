//! A simulated editor frame loop: pools, a document cache, panel resources and memory pressure

use lifecore::{
    CacheConfiguration, FrameScheduler, LifecycleContext, MemoryGauge, PoolConfiguration,
    Poolable, ResourceDescriptor, ResourceKind, ResourceTracker, TrackerConfiguration,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct Particle {
    x: f32,
    y: f32,
    life: u32,
}

impl Poolable for Particle {
    type Args = (f32, f32);

    fn reset(&mut self) {
        *self = Particle::default();
    }

    fn init(&mut self, (x, y): (f32, f32)) {
        self.x = x;
        self.y = y;
        self.life = 60;
    }
}

fn main() {
    println!("=== lifecore - frame loop ===\n");

    let scheduler = Arc::new(FrameScheduler::new());
    let gauge = Arc::new(MemoryGauge::new());
    let tracker = ResourceTracker::new(
        TrackerConfiguration::new()
            .with_max_age(Duration::from_millis(50))
            .with_cleanup_interval(30)
            .with_memory_check_interval(60),
    )
    .with_memory_source(gauge.clone());

    let context = LifecycleContext::from_tracker(
        tracker,
        scheduler.clone(),
        CacheConfiguration::new().with_max_size(64 * 1024),
    );
    context.initialize();

    let particles = context.create_pool::<Particle>(
        PoolConfiguration::new()
            .with_name("particles")
            .with_capacity(256)
            .with_preallocate(64),
    );
    let documents = context.create_cache::<String>("documents");

    // Example 1: open a panel with listeners and a cached document
    open_panel(&context, &documents, "panel:quest");

    // Example 2: run frames, spawning and recycling particles
    {
        let first = particles.checkout((1.0, 2.0));
        println!("2. First particle: {:?}", *first);
    }
    for frame in 0..120 {
        let burst: Vec<_> = (0..32)
            .map(|i| particles.checkout((frame as f32, i as f32)))
            .collect();
        drop(burst);

        if frame == 90 {
            gauge.set(88.0);
        }
        scheduler.tick();
    }

    let stats = particles.lock().get_stats();
    println!("   Particles:");
    println!("   Created: {}", stats.total_created);
    println!("   Returned: {}", stats.total_returned);
    println!("   Idle after pressure sweep: {}\n", stats.available);

    // Example 3: close the panel
    let cleaned = context.tracker().cleanup_context("panel:quest");
    println!("3. Closed panel:quest, cleaned {cleaned} items");
    println!("   Document cached: {}\n", documents.lock().has("quest.json"));

    // Example 4: health and stats
    let health = context.tracker().get_health_status();
    println!("4. Health:");
    println!("   Healthy: {}", health.is_healthy());
    for warning in &health.warnings {
        println!("   Warning: {warning}");
    }
    for (key, value) in context.tracker().get_stats().export() {
        println!("   {key}: {value}");
    }

    #[cfg(feature = "metrics")]
    prometheus_export(&context, &documents);

    if let Some(stats) = context.dispose() {
        println!("\nDisposed, cleaned {} remaining resources", stats.cleaned);
    }
}

fn open_panel(context: &LifecycleContext, documents: &lifecore::SharedCache<String>, panel: &str) {
    println!("1. Opening {panel}:");

    for event in ["click", "scroll", "resize"] {
        let label = format!("{panel}:{event}");
        context.tracker().track_resource(
            ResourceDescriptor::new(ResourceKind::Listener, move || {
                println!("   detached {label}");
            })
            .with_context(panel),
        );
    }

    documents
        .lock()
        .cache("quest.json", r#"{"quests":[]}"#.to_string(), "Quest log");
    context.tracker().track_resource(
        ResourceDescriptor::cache_entry(documents, "quest.json").with_context(panel),
    );

    let name = panel.to_string();
    context.tracker().register_context_cleanup(panel, move || {
        println!("   {name} torn down");
    });

    println!("   Tracked: {:?}\n", context.tracker().get_resource_breakdown());
}

#[cfg(feature = "metrics")]
fn prometheus_export(context: &LifecycleContext, documents: &lifecore::SharedCache<String>) {
    use lifecore::PrometheusExporter;

    println!("\n5. Prometheus export:");
    match PrometheusExporter::new("frame_loop") {
        Ok(exporter) => {
            exporter.observe_tracker(&context.tracker().get_stats());
            exporter.observe_cache(&documents.lock().get_stats());
            match exporter.encode() {
                Ok(text) => {
                    for line in text.lines().filter(|line| !line.starts_with('#')) {
                        println!("   {line}");
                    }
                }
                Err(err) => println!("   encode failed: {err}"),
            }
        }
        Err(err) => println!("   exporter unavailable: {err}"),
    }
}
