use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use grove_runtime::{
    CacheConfig, CacheResult, CachedClass, CachedMethod, CallSiteCache, CallSiteKey, ClassInfoCache, ClassKey,
    ClassSource, MethodBinding,
};
use std::sync::Arc;

struct Stub;

impl ClassSource for Stub {
    fn describe(&self, _key: &ClassKey) -> CacheResult<CachedClass> {
        Ok(CachedClass {
            methods: vec![CachedMethod::new("call", &["java.lang.Object"], "java.lang.Object")],
            fields: Vec::new(),
        })
    }
}

fn filled(classes: usize) -> (Arc<ClassInfoCache>, Vec<ClassKey>) {
    let cache = Arc::new(ClassInfoCache::new(&CacheConfig::default(), Arc::new(Stub)).unwrap());
    let keys: Vec<ClassKey> = (0..classes).map(|i| ClassKey::system(&format!("bench.C{}", i))).collect();
    for key in &keys {
        cache.get_or_compute(key);
    }
    (cache, keys)
}

fn bench_class_info_hits(c: &mut Criterion) {
    let mut group = c.benchmark_group("class_info");
    for classes in [16usize, 1024] {
        let (cache, keys) = filled(classes);
        group.bench_with_input(BenchmarkId::new("hit", classes), &keys, |b, keys| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % keys.len();
                black_box(cache.get_or_compute(&keys[i]))
            });
        });
    }
    group.finish();
}

fn bench_redefine_and_recompute(c: &mut Criterion) {
    let (cache, keys) = filled(64);
    c.bench_function("class_info_redefine", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % keys.len();
            cache.redefine(&keys[i]);
            black_box(cache.get_or_compute(&keys[i]))
        });
    });
}

fn bench_call_site_hits(c: &mut Criterion) {
    let (cache, keys) = filled(64);
    let sites = CallSiteCache::new(Arc::clone(&cache), 1024);
    let site = CallSiteKey::new(keys[0].clone(), "call", vec![keys[1].clone()]);
    let binding = MethodBinding {
        owner: keys[0].clone(),
        method: CachedMethod::new("call", &["java.lang.Object"], "java.lang.Object"),
    };
    sites.get_or_bind(&site, |_| Some(binding.clone()));
    c.bench_function("call_site_hit", |b| b.iter(|| black_box(sites.get(&site))));
}

criterion_group!(benches, bench_class_info_hits, bench_redefine_and_recompute, bench_call_site_hits);
criterion_main!(benches);
