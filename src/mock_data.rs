use rand::rngs::StdRng;
use rand::seq::SliceRandom;

// ─── Name pools ──────────────────────────────────────────────────

static SERVICES: &[&str] = &[
    "frontend",
    "checkout",
    "cart",
    "payments",
    "inventory",
    "shipping",
    "recommendations",
    "search",
    "auth",
    "notifications",
];

static OPERATIONS: &[&str] = &[
    "GET /",
    "GET /items/:id",
    "POST /items",
    "PUT /items/:id",
    "DELETE /items/:id",
    "GET /health",
    "grpc.Query",
    "grpc.Mutate",
    "kafka.consume",
    "redis.GET",
    "redis.SET",
    "sql.SELECT",
];

static HOST_PREFIXES: &[&str] = &["guntur", "peta", "tenali", "dell", "lncol", "utfhy"];

// ─── Public helpers ──────────────────────────────────────────────

/// Pick `services` services and `operations` operations for each.
/// Counts are clamped to the size of the pools.
pub fn catalog(rng: &mut StdRng, services: usize, operations: usize) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for service in SERVICES.choose_multiple(rng, services.min(SERVICES.len())) {
        for operation in OPERATIONS.choose_multiple(rng, operations.min(OPERATIONS.len())) {
            pairs.push((service.to_string(), operation.to_string()));
        }
    }
    pairs
}

/// A collector-style hostname, e.g. `tenali3f9c0a1b`.
pub fn hostname(id: usize) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", HOST_PREFIXES[id % HOST_PREFIXES.len()], &suffix[..8])
}
