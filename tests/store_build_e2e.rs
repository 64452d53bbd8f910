use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

use molvault::{
    standard_registry, BuildOptions, InputFormat, MolStore, MolvaultError, SmilesCodec,
    StoreBuilder,
};

fn build(input: &str, store: &Path, options: BuildOptions) -> molvault::BuildReport {
    StoreBuilder::new(options, SmilesCodec, standard_registry().unwrap())
        .build_from_reader(input.as_bytes(), store)
        .unwrap()
}

fn alkylbenzenes(n: usize) -> String {
    (0..n)
        .map(|i| format!("{}c1ccccc1 {}\n", "C".repeat(i), i))
        .collect()
}

#[test]
fn test_benzene_subset_example() {
    let dir = tempdir().unwrap();
    let store_path = dir.path().join("benzene");
    let report = build(
        "c1ccccc1 0",
        &store_path,
        BuildOptions::default().with_descriptors("Basic2DSubset"),
    );
    assert_eq!(report.rows, 1);

    let store = MolStore::open(&store_path).unwrap();
    assert_eq!(store.row_count(), 1);
    assert_eq!(store.lookup_name("0").unwrap(), 0);

    let row = store.descriptors().get(0).unwrap();
    assert_eq!(row, &[78.046950192, 0.0, 1.0, 0.0, 1.0]);
}

#[test]
fn test_alkylbenzene_subset_rows() {
    let dir = tempdir().unwrap();
    let store_path = dir.path().join("many");
    build(
        &alkylbenzenes(10),
        &store_path,
        BuildOptions::default().with_descriptors("Basic2DSubset"),
    );

    let masses = [
        78.046950192,
        92.062600256,
        106.07825032,
        120.093900384,
        134.109550448,
        148.125200512,
        162.140850576,
        176.15650064,
        190.172150704,
        204.187800768,
    ];
    let store = MolStore::open(&store_path).unwrap();
    for (i, mass) in masses.iter().enumerate() {
        let row = store.descriptors().get(i).unwrap();
        assert_eq!(row, &[*mass, 0.0, 1.0, 0.0, 1.0], "row {}", i);
    }
}

#[test]
fn test_structure_index_disabled_example() {
    let dir = tempdir().unwrap();
    let store_path = dir.path().join("no-keys");
    build(
        &alkylbenzenes(10),
        &store_path,
        BuildOptions::default().with_structure_index(false),
    );
    assert!(!store_path.join("structures.idx").exists());

    let store = MolStore::open(&store_path).unwrap();
    assert!(!store.has_structure_index());
    for i in 0..10u64 {
        assert_eq!(store.lookup_name(&i.to_string()).unwrap(), i);

        let mol = store.entity_at(i, &SmilesCodec).unwrap();
        let key = molvault_chem::structural_key(&mol);
        assert!(matches!(
            store.lookup_structural_key(&key),
            Err(MolvaultError::NotIndexed)
        ));
    }
    assert!(matches!(
        store.lookup_structural_key("ANYTHING"),
        Err(MolvaultError::NotIndexed)
    ));
}

#[test]
fn test_round_trip_properties() {
    let dir = tempdir().unwrap();
    let store_path = dir.path().join("store");
    build(&alkylbenzenes(10), &store_path, BuildOptions::default());

    let store = MolStore::open(&store_path).unwrap();
    assert!(store.has_structure_index());
    for i in 0..store.row_count() {
        // 1. Every row has the schema width
        assert_eq!(store.descriptors().get(i as usize).unwrap().len(), store.width());

        // 2. Name round-trip
        let name = store.name_at(i).unwrap();
        assert_eq!(name, i.to_string());
        assert_eq!(store.lookup_name(name).unwrap(), i);

        // 3. Structural key round-trip; each alkylbenzene is its own structure
        let mol = store.entity_at(i, &SmilesCodec).unwrap();
        let key = molvault_chem::structural_key(&mol);
        assert_eq!(store.lookup_structural_key(&key).unwrap(), vec![i]);
    }

    assert!(matches!(
        store.lookup_name("10"),
        Err(MolvaultError::NotFound { .. })
    ));
    assert!(matches!(
        store.lookup_structural_key("AAAAAAAAAAAAAA-AAAAAAAAAA-N"),
        Err(MolvaultError::NotFound { .. })
    ));
    assert!(matches!(
        store.descriptors().get(10),
        Err(molvault_core::store::StoreError::OutOfRange { .. })
    ));
    assert!(matches!(
        store.row(10),
        Err(MolvaultError::OutOfRange { ordinal: 10, count: 10 })
    ));
    assert!(matches!(
        store.entity_bytes(99),
        Err(MolvaultError::OutOfRange { .. })
    ));
}

#[test]
fn test_concatenation_law() {
    let dir = tempdir().unwrap();
    let input = alkylbenzenes(6);
    let single = dir.path().join("single");
    let double = dir.path().join("double");
    build(&input, &single, BuildOptions::default().with_descriptors("Basic2D"));
    build(&input, &double, BuildOptions::default().with_descriptors("Basic2D,Basic2D"));

    let single = MolStore::open(&single).unwrap();
    let double = MolStore::open(&double).unwrap();
    assert_eq!(double.width(), 2 * single.width());
    assert_eq!(double.schema().entries.len(), 2);

    for i in 0..single.row_count() {
        let one = single.row(i).unwrap();
        let two = double.row(i).unwrap();
        assert_eq!(two, [one, one].concat().as_slice());
    }
}

#[test]
fn test_shared_structures_keep_row_order() {
    let dir = tempdir().unwrap();
    let store_path = dir.path().join("store");
    let input = "CCO ethanol\nOCC ethanol-rev\nc1ccccc1 benzene\nC(O)C ethanol-branch\n";
    build(input, &store_path, BuildOptions::default().with_batch_size(1));

    let store = MolStore::open(&store_path).unwrap();
    let key = molvault_chem::structural_key(&molvault_chem::parse("CCO").unwrap());
    assert_eq!(store.lookup_structural_key(&key).unwrap(), vec![0, 1, 3]);
    assert_eq!(store.manifest().distinct_structures, Some(2));
}

/// Random input drawn from a fixed pool, with invalid rows and repeated names
fn random_input(rng: &mut StdRng, rows: usize) -> String {
    const POOL: &[&str] = &[
        "c1ccccc1",
        "Cc1ccccc1",
        "CCO",
        "c1ccncc1",
        "C1CCCCC1",
        "CC(=O)[O-]",
        "c1ccc2ccccc2c1",
        "C1CC2CCC1C2",
        "[13CH4]",
        "C1CC",
        "Xx",
    ];
    (0..rows)
        .map(|_| {
            let smiles = POOL[rng.gen_range(0..POOL.len())];
            let name = format!("m{}", rng.gen_range(0..rows * 3 / 4));
            format!("{} {}\n", smiles, name)
        })
        .collect()
}

#[test]
fn test_batch_size_invariance() {
    let mut rng = StdRng::seed_from_u64(7);
    let input = random_input(&mut rng, 300);
    let dir = tempdir().unwrap();

    let mut batch_sizes = vec![1, 7, 300];
    batch_sizes.push(rng.gen_range(2..300));

    let stores: Vec<_> = batch_sizes
        .iter()
        .map(|&batch_size| {
            let path = dir.path().join(format!("b{}", batch_size));
            let report = build(
                &input,
                &path,
                BuildOptions::default()
                    .with_descriptors("Basic2D,Mass")
                    .with_batch_size(batch_size),
            );
            assert!(report.skipped > 0);
            (path, report)
        })
        .collect();

    let (reference_path, reference_report) = &stores[0];
    for (path, report) in &stores[1..] {
        assert_eq!(report.rows, reference_report.rows);
        assert_eq!(report.skipped, reference_report.skipped);
        assert_eq!(report.duplicate_names, reference_report.duplicate_names);
        for file in ["descriptors.col", "entities.bin", "entities.off", "names.idx", "structures.idx"] {
            assert_eq!(
                std::fs::read(reference_path.join(file)).unwrap(),
                std::fs::read(path.join(file)).unwrap(),
                "{} differs for {:?}",
                file,
                path
            );
        }
    }

    let reference = MolStore::open(reference_path).unwrap();
    for (path, _) in &stores[1..] {
        let other = MolStore::open(path).unwrap();
        for i in 0..reference.row_count() {
            let name = reference.name_at(i).unwrap();
            assert_eq!(reference.lookup_name(name).unwrap(), other.lookup_name(name).unwrap());
            let key = molvault_chem::structural_key(&reference.entity_at(i, &SmilesCodec).unwrap());
            assert_eq!(
                reference.lookup_structural_key(&key).unwrap(),
                other.lookup_structural_key(&key).unwrap()
            );
        }
    }
}

#[test]
fn test_many_runs_merge() {
    // batch size 1 spills one run per row, forcing intermediate merges
    let dir = tempdir().unwrap();
    let store_path = dir.path().join("store");
    let input: String = (0..200)
        .map(|i| format!("{}O n{:03}\n", "C".repeat(1 + i % 5), 199 - i))
        .collect();
    let report = build(&input, &store_path, BuildOptions::default().with_batch_size(1));
    assert_eq!(report.rows, 200);

    let store = MolStore::open(&store_path).unwrap();
    for i in 0..200u64 {
        assert_eq!(store.lookup_name(&format!("n{:03}", 199 - i)).unwrap(), i);
    }
    let methanol = molvault_chem::structural_key(&molvault_chem::parse("CO").unwrap());
    let rows = store.lookup_structural_key(&methanol).unwrap();
    assert_eq!(rows, (0..200).step_by(5).collect::<Vec<u64>>());
}

#[test]
fn test_header_separator_and_ordinal_names() {
    let dir = tempdir().unwrap();
    let store_path = dir.path().join("store");
    let options = BuildOptions {
        input: InputFormat {
            has_header: true,
            smiles_column: 2,
            name_column: None,
            separator: Some(",".into()),
        },
        ..BuildOptions::default().with_descriptors("Mass")
    };
    build("id,label,smiles\n1,x,CCO\n2,y\n3,z,c1ccccc1\n", &store_path, options);

    let store = MolStore::open(&store_path).unwrap();
    assert_eq!(store.row_count(), 2);
    assert_eq!(store.name_at(0).unwrap(), "0");
    assert_eq!(store.name_at(1).unwrap(), "1");
    assert_eq!(store.lookup_name("1").unwrap(), 1);
    assert_eq!(store.manifest().options.input.smiles_column, 2);
}

#[test]
fn test_empty_input_builds_empty_store() {
    let dir = tempdir().unwrap();
    let store_path = dir.path().join("empty");
    let report = build("\n\n", &store_path, BuildOptions::default());
    assert_eq!(report.rows, 0);
    assert_eq!(report.skipped, 0);

    let store = MolStore::open(&store_path).unwrap();
    assert_eq!(store.row_count(), 0);
    assert!(store.descriptors().is_empty());
    assert!(matches!(
        store.lookup_name("anything"),
        Err(MolvaultError::NotFound { .. })
    ));
    assert!(matches!(
        store.row(0),
        Err(MolvaultError::OutOfRange { ordinal: 0, count: 0 })
    ));
    store.verify().unwrap();
}
