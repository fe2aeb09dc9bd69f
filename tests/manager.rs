extern crate crayon_res;
extern crate env_logger;
#[macro_use]
extern crate failure;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use crayon_res::prelude::*;

/// Decodes any path ending with `.png` into a `size` x `size` gray image.
fn testbed(settings: Settings, size: u32) -> (AssetManager, Arc<AtomicUsize>) {
    let _ = env_logger::try_init();

    let decodes = Arc::new(AtomicUsize::new(0));
    let counter = decodes.clone();
    let decoder = move |path: &str| -> std::result::Result<Texture, failure::Error> {
        counter.fetch_add(1, Ordering::SeqCst);
        if !path.ends_with(".png") {
            bail!("{} is not an image", path);
        }

        Ok(Texture {
            pixels: vec![128; (size * size * 4) as usize],
            width: size,
            height: size,
            channels: 4,
        })
    };

    (AssetManager::new(settings, decoder).unwrap(), decodes)
}

fn material(name: &str) -> MaterialDesc {
    let mut desc = MaterialDesc::default();
    desc.name = name.to_owned();
    desc.base_color_factor = [0.8, 0.2, 0.2, 1.0];
    desc.roughness_factor = 0.4;

    let mut slot = TextureSlot::new(1);
    slot.transform = Some(TextureTransform {
        offset: [0.5, 0.0],
        rotation: 0.25,
        scale: [2.0, 2.0],
        tex_coord: None,
    });
    desc.base_color_texture = Some(slot);
    desc
}

fn triangle() -> MeshDesc {
    let mut desc = MeshDesc::default();
    desc.vertices = vec![
        Vertex::new([0.0, 0.0, 0.0]),
        Vertex::new([1.0, 0.0, 0.0]),
        Vertex::new([0.0, 1.0, 0.0]),
    ];
    desc.indices = vec![0, 1, 2];
    desc
}

#[test]
fn textures_dedup_by_path() {
    let (assets, decodes) = testbed(Settings::default(), 4);

    let a = assets.load_texture("textures/wall.png").unwrap();
    let b = assets.load_texture("textures//./wall.png").unwrap();
    let c = assets.load_texture("textures\\floor\\..\\wall.png").unwrap();

    assert!(Resource::ptr_eq(&a, &b));
    assert!(Resource::ptr_eq(&a, &c));
    assert_eq!(decodes.load(Ordering::SeqCst), 1);
    assert_eq!(a.identifier().as_str(), "textures/wall.png");
    assert_eq!((a.width, a.height, a.channels), (4, 4, 4));
    assert_eq!(a.pixels.len(), 64);

    let stats = assets.stats().textures;
    assert_eq!(stats.total_weight, 64);
    assert_eq!(stats.hits, 2);
}

#[test]
fn texture_decode_failure() {
    let (assets, _) = testbed(Settings::default(), 4);

    match assets.load_texture("textures/wall.tga") {
        Err(Error::DecodeFailure(id, _)) => assert_eq!(id.as_str(), "textures/wall.tga"),
        other => panic!("unexpected {:?}", other),
    }

    assert!(assets.load_texture("").is_err());
}

#[test]
fn textures_bounded_by_bytes() {
    let mut settings = Settings::default();
    settings.texture = CacheParams::lru(16, 200);

    // 8 x 8 x 4 = 256 bytes is over budget, but still handed out.
    let (assets, _) = testbed(settings.clone(), 8);
    let a = assets.load_texture("big.png").unwrap();
    assert_eq!(a.size(), 256);
    assert!(!assets.textures().cache().contains("big.png"));
    drop(a);
    assert!(!assets.textures().registry().contains("big.png"));

    // 4 x 4 x 4 = 64 bytes, so three of them fit.
    let (assets, _) = testbed(settings, 4);
    for i in 0..4 {
        let _ = assets.load_texture(&format!("{}.png", i)).unwrap();
    }

    let stats = assets.stats().textures;
    assert_eq!(stats.entries, 3);
    assert_eq!(stats.total_weight, 192);
    assert_eq!(stats.evictions, 1);
    assert!(!assets.textures().cache().contains("0.png"));
}

#[test]
fn materials_dedup_by_content() {
    let (assets, _) = testbed(Settings::default(), 4);

    let lhs = assets.load_material(&material("lhs")).unwrap();
    let rhs = assets.load_material(&material("rhs")).unwrap();

    assert!(Resource::ptr_eq(&lhs, &rhs));
    assert_eq!(lhs.identifier().len(), 16);
    assert_eq!(lhs.name, "lhs");

    // Two callers plus the cache.
    assert_eq!(lhs.ref_count(), 3);
    assert_eq!(assets.materials().registry().len(), 1);

    let mut other = material("lhs");
    other.double_sided = true;
    let other = assets.load_material(&other).unwrap();
    assert!(!Resource::ptr_eq(&lhs, &other));

    assert!(!assets.release_material(lhs));
    assert!(!assets.release_material(rhs));
    assert_eq!(other.ref_count(), 2);
}

#[test]
fn invalid_material() {
    let (assets, _) = testbed(Settings::default(), 4);

    let mut desc = material("broken");
    desc.roughness_factor = -1.0;
    assert!(assets.load_material(&desc).is_err());

    let id = assets.materials().identify(&desc).unwrap();
    assert_eq!(assets.materials().states().get(&id), ResourceState::Error);
}

#[test]
fn meshes_and_async() {
    let (assets, _) = testbed(Settings::default(), 4);

    let (tx, rx) = mpsc::channel();
    for _ in 0..8 {
        let tx = tx.clone();
        assets.load_mesh_async(triangle(), move |rsp| {
            tx.send(rsp).unwrap();
        });
    }

    let mut meshes = Vec::new();
    for _ in 0..8 {
        let rsp = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("deadlock found!");
        meshes.push(rsp.unwrap());
    }

    assert!(meshes.iter().all(|v| Resource::ptr_eq(v, &meshes[0])));
    assert_eq!(meshes[0].indices, vec![0, 1, 2]);
    assert_eq!(meshes[0].aabb().unwrap().max, [1.0, 1.0, 0.0]);

    let direct = assets.load_mesh(&triangle()).unwrap();
    assert!(Resource::ptr_eq(&direct, &meshes[0]));
    assert_eq!(assets.meshes().registry().len(), 1);
}

#[test]
fn texture_and_material_async() {
    let (assets, _) = testbed(Settings::default(), 4);
    let (tx, rx) = mpsc::channel();

    {
        let tx = tx.clone();
        assets.load_texture_async("a.png".to_owned(), move |rsp| {
            tx.send(rsp.map(|v| v.identifier().clone())).unwrap();
        });
    }

    assets.load_material_async(material("m"), move |rsp| {
        tx.send(rsp.map(|v| v.identifier().clone())).unwrap();
    });

    let mut ids = Vec::new();
    for _ in 0..2 {
        let rsp = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("deadlock found!");
        ids.push(rsp.unwrap());
    }

    assert!(ids.iter().any(|v| v.as_str() == "a.png"));
}

#[test]
fn shutdown_drains_caches() {
    let (assets, _) = testbed(Settings::default(), 4);

    let kept = assets.load_texture("kept.png").unwrap();
    let _ = assets.load_texture("dropped.png").unwrap();
    let _ = assets.load_material(&material("m")).unwrap();

    assets.shutdown();
    assert!(assets.textures().cache().is_empty());
    assert!(!assets.textures().cache().is_initialized());
    assert!(assets.materials().registry().is_empty());

    // Still valid until released.
    assert_eq!(kept.width, 4);
    assert_eq!(assets.textures().registry().identifiers(), vec![kept.identifier().clone()]);
    assert!(assets.release_texture(kept));
    assert!(assets.textures().registry().is_empty());

    assets.shutdown();
}

#[test]
fn settings_from_json() {
    let json = r#"{
        "texture": { "policy": "lru", "max_entries": 2, "max_weight": 1024 },
        "sched": { "workers": 0 },
        "load_timeout_ms": 250
    }"#;

    let settings = Settings::from_json(json).unwrap();
    assert_eq!(settings.load_timeout(), Duration::from_millis(250));

    let (assets, _) = testbed(settings, 4);
    assert!(assets.scheduler().is_headless());
    assert_eq!(assets.textures().timeout(), Duration::from_millis(250));
    assert_eq!(assets.stats().textures.max_entries, 2);

    // Headless schedulers load on the calling thread.
    let (tx, rx) = mpsc::channel();
    assets.load_texture_async("a.png", move |rsp| tx.send(rsp.is_ok()).unwrap());
    assert_eq!(rx.try_recv(), Ok(true));
}
