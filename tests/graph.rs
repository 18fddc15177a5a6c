use std::io::Write;

use tablestream::operators::{Count, FileSource, Identity, Joiner, LowerCase, Sum};
use tablestream::{row, Error, Graph, Row, Sources};

#[test]
fn identity_map_is_a_no_op() {
    let graph = Graph::from_named_source("rows").map(Identity);
    let rows = vec![
        row! { "k" => 2, "text" => "b" },
        row! { "k" => 1, "text" => "a" },
    ];
    let sources = Sources::new().rows("rows", rows.clone());
    assert_eq!(graph.collect(&sources).unwrap(), rows);
}

#[test]
fn file_source_uses_the_supplied_parser() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pairs.tsv");
    std::fs::write(&path, "1\thello\n2\tworld\n").unwrap();

    let source = FileSource::with_parser(&path, |line: &str| {
        let (id, text) = line.split_once('\t').ok_or("expected a tab")?;
        Ok(row! { "id" => id.parse::<i64>()?, "text" => text })
    });
    let graph = Graph::from_file_source(source);

    assert_eq!(
        graph.collect(&Sources::new()).unwrap(),
        vec![
            row! { "id" => 1, "text" => "hello" },
            row! { "id" => 2, "text" => "world" },
        ]
    );
}

#[test]
fn malformed_lines_surface_with_their_position() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rows.json");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, r#"{{"ok": 1}}"#).unwrap();
    writeln!(file, "not json").unwrap();
    drop(file);

    let graph = Graph::from_file(&path);
    let err = graph.collect(&Sources::new()).unwrap_err();
    assert!(matches!(err, Error::SourceParse { line: 2, .. }));
}

#[test]
fn map_transforms_every_row() {
    let graph = Graph::from_named_source("texts").map(LowerCase::new("text"));

    let sources = Sources::new().rows(
        "texts",
        vec![
            row! { "doc_id" => 1, "text" => "HELLO HELLO! WORLD..." },
            row! { "doc_id" => 2, "text" => "world? world... world!!! WORLD!!! HELLO!!!" },
        ],
    );

    assert_eq!(
        graph.collect(&sources).unwrap(),
        vec![
            row! { "doc_id" => 1, "text" => "hello hello! world..." },
            row! { "doc_id" => 2, "text" => "world? world... world!!! world!!! hello!!!" },
        ]
    );
}

#[test]
fn reduce_sums_each_group() {
    let graph = Graph::from_named_source("texts").reduce(Sum::new("count"), &["doc_id"]);

    let sources = Sources::new().rows(
        "texts",
        vec![
            row! { "doc_id" => 1, "count" => 22 },
            row! { "doc_id" => 1, "count" => 20 },
            row! { "doc_id" => 2, "count" => 39 },
            row! { "doc_id" => 2, "count" => 1 },
        ],
    );

    assert_eq!(
        graph.collect(&sources).unwrap(),
        vec![
            row! { "doc_id" => 1, "count" => 42 },
            row! { "doc_id" => 2, "count" => 40 },
        ]
    );
}

#[test]
fn sort_orders_by_key() {
    let graph = Graph::from_named_source("texts").sort(&["doc_id"]);

    let sources = Sources::new().rows(
        "texts",
        vec![
            row! { "doc_id" => 7, "count" => 1 },
            row! { "doc_id" => 3, "count" => 2 },
            row! { "doc_id" => 1, "count" => 3 },
            row! { "doc_id" => 5, "count" => 4 },
            row! { "doc_id" => 45, "count" => 4 },
            row! { "doc_id" => 11, "count" => 4 },
        ],
    );

    assert_eq!(
        graph.collect(&sources).unwrap(),
        vec![
            row! { "doc_id" => 1, "count" => 3 },
            row! { "doc_id" => 3, "count" => 2 },
            row! { "doc_id" => 5, "count" => 4 },
            row! { "doc_id" => 7, "count" => 1 },
            row! { "doc_id" => 11, "count" => 4 },
            row! { "doc_id" => 45, "count" => 4 },
        ]
    );
}

#[test]
fn join_merges_matching_groups() {
    let right = Graph::from_named_source("texts2");
    let graph =
        Graph::from_named_source("texts1").join(Joiner::inner(), &right.clone(), &["doc_id"]);

    let sources = Sources::new()
        .rows(
            "texts1",
            vec![
                row! { "doc_id" => 1, "text1" => "hello" },
                row! { "doc_id" => 2, "text1" => "world" },
            ],
        )
        .rows(
            "texts2",
            vec![
                row! { "doc_id" => 1, "text2" => "bye" },
                row! { "doc_id" => 2, "text2" => "world" },
            ],
        );

    assert_eq!(
        graph.collect(&sources).unwrap(),
        vec![
            row! { "doc_id" => 1, "text1" => "hello", "text2" => "bye" },
            row! { "doc_id" => 2, "text1" => "world", "text2" => "world" },
        ]
    );
}

#[test]
fn cloned_graphs_produce_equal_streams() {
    let graph = Graph::from_named_source("texts")
        .sort(&["text"])
        .reduce(Count::new("count"), &["text"]);
    let cloned = graph.clone();

    let rows = vec![
        row! { "text" => "b" },
        row! { "text" => "a" },
        row! { "text" => "b" },
    ];
    let sources = Sources::new().rows("texts", rows);

    assert_eq!(
        graph.collect(&sources).unwrap(),
        cloned.collect(&sources).unwrap()
    );
}

#[test]
fn reruns_are_independent() {
    let graph = Graph::from_named_source("texts")
        .sort(&["text"])
        .reduce(Count::new("count"), &["text"]);

    let first = Sources::new().rows(
        "texts",
        vec![row! { "text" => "a" }, row! { "text" => "a" }],
    );
    assert_eq!(
        graph.collect(&first).unwrap(),
        vec![row! { "text" => "a", "count" => 2 }]
    );

    let second = Sources::new().rows(
        "texts",
        vec![row! { "text" => "b" }, row! { "text" => "c" }],
    );
    assert_eq!(
        graph.collect(&second).unwrap(),
        vec![
            row! { "text" => "b", "count" => 1 },
            row! { "text" => "c", "count" => 1 },
        ]
    );

    // The first sources are still usable afterwards.
    assert_eq!(
        graph.collect(&first).unwrap(),
        vec![row! { "text" => "a", "count" => 2 }]
    );
}

#[test]
fn unsorted_reduce_input_is_detected() {
    let graph = Graph::from_named_source("texts").reduce(Count::new("count"), &["k"]);
    let sources = Sources::new().rows("texts", vec![row! { "k" => 2 }, row! { "k" => 1 }]);

    let mut stream = graph.run(&sources).unwrap();
    // The first group is produced before the violation is reached.
    assert!(stream.next().unwrap().is_ok());
    assert!(matches!(
        stream.next().unwrap(),
        Err(Error::UnsortedInput { .. })
    ));
}

#[test]
fn missing_source_fails_the_run() {
    let graph = Graph::from_named_source("absent");
    let err = graph.collect(&Sources::new()).unwrap_err();
    assert!(matches!(err, Error::MissingSource(name) if name == "absent"));
}

#[test]
fn shared_prefixes_re_execute_per_consumer() {
    // A supplier that counts how many times it is called.
    use std::cell::Cell;
    use std::rc::Rc;

    let calls = Rc::new(Cell::new(0));
    let counted = calls.clone();
    let sources = Sources::new().supply("texts", move || {
        counted.set(counted.get() + 1);
        let rows: Vec<Row> = vec![row! { "n" => 1 }];
        Box::new(rows.into_iter().map(Ok))
    });

    let prefix = Graph::from_named_source("texts");
    let graph = prefix.join(Joiner::inner(), &prefix.clone(), &["n"]);

    graph.collect(&sources).unwrap();
    assert_eq!(calls.get(), 2);
}
