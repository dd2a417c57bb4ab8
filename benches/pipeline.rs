use criterion::{criterion_group, criterion_main, Criterion, black_box};

use orthodsf::core::CancelToken;
use orthodsf::compile::CompileConfig;
use orthodsf::dsf::{encode_dsf, DsfContent, PointPoolBuilder};
use orthodsf::geo::{TextureKey, TileCoord};
use orthodsf::mesh::{grid_mesh, recut_coastline, Mesh, TriType};
use orthodsf::pool::{PoolQuadtree, PoolSet, CAPACITY, INIT_DEPTH};
use orthodsf::terrain::{Classification, Draw, TerrainDef, VertexStyle};

const TILE: TileCoord = TileCoord { lat: 45, lon: 5 };

/// Land everywhere except a lake in the middle third.
fn lake_mesh(n: u32) -> Mesh {
    grid_mesh(n, n, |i, j, _| {
        let inner = n / 3..2 * n / 3;
        if inner.contains(&i) && inner.contains(&j) {
            TriType::Water
        } else {
            TriType::Land
        }
    })
}

fn bench_quadtree_insert_64k(c: &mut Criterion) {
    let mesh = grid_mesh(255, 255, |_, _, _| TriType::Land);

    c.bench_function("quadtree_insert_64k", |b| {
        b.iter(|| {
            let mut tree = PoolQuadtree::new(INIT_DEPTH, 1000);
            for node in &mesh.nodes {
                tree.insert(black_box(node.lon()), black_box(node.lat())).unwrap();
            }
            tree.clean();
            tree.bucket_count()
        });
    });
}

fn bench_pool_set_build(c: &mut Criterion) {
    let mesh = grid_mesh(255, 255, |_, _, _| TriType::Land);

    c.bench_function("pool_set_build_64k", |b| {
        b.iter(|| PoolSet::build(black_box(&mesh), TILE, INIT_DEPTH, CAPACITY).unwrap());
    });
}

fn bench_recut_lake(c: &mut Criterion) {
    let mesh = lake_mesh(120);

    c.bench_function("recut_lake_120", |b| {
        b.iter(|| {
            let mut m = mesh.clone();
            recut_coastline(black_box(&mut m))
        });
    });
}

fn bench_encode_single_terrain(c: &mut Criterion) {
    let mesh = grid_mesh(200, 200, |_, _, _| TriType::Land);
    let config = CompileConfig::default();
    let pools = PoolSet::build(&mesh, TILE, INIT_DEPTH, CAPACITY).unwrap();
    let land = TerrainDef {
        id: 1,
        name: "terrain/5888_8448_BI14.ter".into(),
        key: Some(TextureKey::new(8448, 5888, 14, "BI")),
        kind: TriType::Land,
        style: VertexStyle::Shaded,
        overlay: false,
        descriptor: None,
    };
    let classes = Classification {
        terrains: vec![TerrainDef::water(), land],
        draws: (0..mesh.triangle_count() as u32).map(|tri| Draw { tri, terrain: 1 }).collect(),
        ..Default::default()
    };

    c.bench_function("encode_dsf_80k_triangles", |b| {
        b.iter(|| {
            let encoded = PointPoolBuilder::new(&mesh, &pools, TILE, &config)
                .build(black_box(&classes), &CancelToken::new())
                .unwrap();
            let content = DsfContent {
                tile: TILE,
                terrains: &classes.terrains,
                pools: &encoded,
                rasters: None,
                overlay_lod: config.overlay_lod,
            };
            encode_dsf(&content).unwrap().0.len()
        });
    });
}

criterion_group!(
    benches,
    bench_quadtree_insert_64k,
    bench_pool_set_build,
    bench_recut_lake,
    bench_encode_single_terrain,
);
criterion_main!(benches);
