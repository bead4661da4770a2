use std::sync::Arc;

use serde_json::Value;

use slate_engine::schema::{
    ColumnDecl, ColumnFactory, ColumnSchema, KeyColumnDecl, RemoteKey, SchemaFragment,
    SchemaResolver, TableSchema,
};
use slate_engine::{Conversion, EngineError};

fn _resolve(fragment: SchemaFragment) -> Result<Arc<TableSchema>, EngineError> {
    SchemaResolver::new().resolve(&Arc::new(fragment))
}

fn _base_fragment() -> Arc<SchemaFragment> {
    Arc::new(
        SchemaFragment::new("Base")
            .with_key(
                "id",
                KeyColumnDecl::new()
                    .with_local(Conversion::TextToInt, Conversion::IntToText),
            )
            .with_column("name", ColumnDecl::new()),
    )
}

#[test]
fn resolver_assigns_dense_slots() {
    let fragment = SchemaFragment::new("Plain")
        .with_column("a", ColumnDecl::new())
        .with_column("b", ColumnDecl::new())
        .with_column("c", ColumnDecl::new());

    let schema = _resolve(fragment).unwrap();

    assert_eq!(schema.len(), 3);
    for (index, column) in schema.columns().enumerate() {
        assert_eq!(column.slot(), index);
    }
}

#[test]
fn resolver_provides_default_key() {
    let schema = _resolve(SchemaFragment::new("Plain").with_column("a", ColumnDecl::new())).unwrap();

    assert_eq!(schema.key().name(), "index");
}

#[test]
fn override_keeps_slot_and_takes_derived_default() {
    let base = _base_fragment();
    let derived = SchemaFragment::new("Derived")
        .with_base(&base)
        .with_column("name", ColumnDecl::new().with_default("x"));

    let schema = _resolve(derived).unwrap();

    let name = schema.column("name").unwrap();
    assert_eq!(name.slot(), 0);
    assert_eq!(name.default(), Some(&Value::from("x")));
    assert_eq!(schema.key().name(), "id");
}

#[test]
fn attribute_shadow_removes_column_and_redeclaration_lands_at_end() {
    let base = Arc::new(
        SchemaFragment::new("Base")
            .with_column("name", ColumnDecl::new())
            .with_column("age", ColumnDecl::new()),
    );
    let mid = Arc::new(SchemaFragment::new("Mid").with_base(&base).with_attribute("name"));
    let derived = SchemaFragment::new("Derived")
        .with_base(&mid)
        .with_column("name", ColumnDecl::new());

    let schema = _resolve(derived).unwrap();

    let order: Vec<&str> = schema.columns().map(|column| column.name()).collect();
    assert_eq!(order, vec!["age", "name"]);
    assert_eq!(schema.column("age").unwrap().slot(), 0);
    assert_eq!(schema.column("name").unwrap().slot(), 1);
}

#[test]
fn diamond_composition_orders_least_derived_first() {
    let root = Arc::new(SchemaFragment::new("Root").with_column("d", ColumnDecl::new()));
    let left = Arc::new(
        SchemaFragment::new("Left")
            .with_base(&root)
            .with_column("b", ColumnDecl::new()),
    );
    let right = Arc::new(
        SchemaFragment::new("Right")
            .with_base(&root)
            .with_column("c", ColumnDecl::new()),
    );
    let top = SchemaFragment::new("Top")
        .with_base(&left)
        .with_base(&right)
        .with_column("a", ColumnDecl::new());

    let schema = _resolve(top).unwrap();

    let order: Vec<&str> = schema.columns().map(|column| column.name()).collect();
    assert_eq!(order, vec!["d", "c", "b", "a"]);
}

#[test]
fn inconsistent_composition_fails() {
    let a = Arc::new(SchemaFragment::new("A"));
    let b = Arc::new(SchemaFragment::new("B"));
    let x = Arc::new(SchemaFragment::new("X").with_base(&a).with_base(&b));
    let y = Arc::new(SchemaFragment::new("Y").with_base(&b).with_base(&a));
    let z = SchemaFragment::new("Z").with_base(&x).with_base(&y);

    let result = _resolve(z);

    assert!(matches!(result, Err(EngineError::AmbiguousComposition(_))));
}

#[test]
fn two_keys_in_one_fragment_fail() {
    let fragment = SchemaFragment::new("Broken")
        .with_key("id", KeyColumnDecl::new())
        .with_key("uid", KeyColumnDecl::new());

    let result = _resolve(fragment);

    assert!(matches!(result, Err(EngineError::MultipleKeyColumns(name)) if name == "Broken"));
}

#[test]
fn derived_key_replaces_base_key() {
    let base = _base_fragment();
    let derived = SchemaFragment::new("Derived")
        .with_base(&base)
        .with_key("uid", KeyColumnDecl::new());

    let schema = _resolve(derived).unwrap();

    assert_eq!(schema.key().name(), "uid");
}

#[test]
fn key_shadowing_a_column_removes_it() {
    let base = Arc::new(SchemaFragment::new("Base").with_column("id", ColumnDecl::new()));
    let derived = SchemaFragment::new("Derived")
        .with_base(&base)
        .with_key("id", KeyColumnDecl::new());

    let schema = _resolve(derived).unwrap();

    assert!(schema.column("id").is_none());
    assert_eq!(schema.key().name(), "id");
}

#[test]
fn non_invertible_key_conversions_fail() {
    let fragment = SchemaFragment::new("Broken").with_key(
        "id",
        KeyColumnDecl::new().with_local(Conversion::TextToInt, Conversion::TextToInt),
    );

    let result = _resolve(fragment);

    assert!(matches!(
        result,
        Err(EngineError::KeyConversionNotInvertible(_))
    ));
}

#[test]
fn missing_column_class_fails_at_resolution() {
    let fragment = SchemaFragment::new("Plain").with_column("a", ColumnDecl::new());

    let result = SchemaResolver::without_fallback().resolve(&Arc::new(fragment));

    assert!(matches!(
        result,
        Err(EngineError::ColumnClassUnresolved(name)) if name == "a"
    ));
}

#[test]
fn fragment_default_factory_satisfies_resolution() {
    struct UppercaseKeys;
    impl ColumnFactory for UppercaseKeys {
        fn build(&self, name: &str, slot: usize, decl: &ColumnDecl) -> ColumnSchema {
            let decl = decl
                .clone()
                .with_remote_key(RemoteKey::fixed(name.to_uppercase()));
            ColumnSchema::from_decl(name, slot, &decl)
        }
    }

    let fragment = SchemaFragment::new("Plain")
        .with_default_factory(Arc::new(UppercaseKeys))
        .with_column("a", ColumnDecl::new());

    let schema = SchemaResolver::without_fallback()
        .resolve(&Arc::new(fragment))
        .unwrap();

    assert_eq!(
        schema.column("a").unwrap().remote_key_for("json").unwrap(),
        "A"
    );
}

#[test]
fn conversion_pairs_round_trip() {
    let pairs = vec![
        (Conversion::Identity, Conversion::Identity),
        (Conversion::TextToInt, Conversion::IntToText),
    ];
    let samples = vec![Value::from("0"), Value::from("42"), Value::from("-7")];

    for (read, write) in pairs {
        assert!(read.is_inverse_of(&write));
        for sample in &samples {
            let loaded = read.apply(sample.clone()).unwrap();
            assert_eq!(write.apply(loaded).unwrap(), sample.clone());
        }
    }
}
