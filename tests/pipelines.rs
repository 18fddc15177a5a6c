use std::io::Write;

use itertools::Itertools;

use tablestream::algorithms::{
    average_speed_graph, inverted_index_graph, pmi_graph, word_count_graph, Input, SpeedColumns,
};
use tablestream::{row, Row, Sources, Value};

fn docs() -> Vec<Row> {
    vec![
        row! { "doc_id" => 1, "text" => "hello, little world" },
        row! { "doc_id" => 2, "text" => "little" },
        row! { "doc_id" => 3, "text" => "little little little" },
        row! { "doc_id" => 4, "text" => "little? hello little world" },
        row! { "doc_id" => 5, "text" => "HELLO HELLO! WORLD..." },
        row! { "doc_id" => 6, "text" => "world? world... world!!! WORLD!!! HELLO!!!" },
    ]
}

fn assert_scored(rows: &[Row], expected: &[(i64, &str, f64)], score_column: &str) {
    assert_eq!(rows.len(), expected.len());
    for (row, (doc_id, text, score)) in rows.iter().zip(expected) {
        assert_eq!(row.get("doc_id"), Some(&Value::Int(*doc_id)));
        assert_eq!(row.get("text"), Some(&Value::from(*text)));
        let actual = row.require_f64(score_column).unwrap();
        assert!(
            (actual - score).abs() < 1e-3,
            "doc {doc_id} word {text}: {actual} vs {score}"
        );
    }
}

#[test]
fn word_count_counts_words() {
    let graph = word_count_graph(Input::source("texts"), "text", "count");
    let sources = Sources::new().rows(
        "texts",
        vec![
            row! { "doc_id" => 1, "text" => "hello, my little WORLD" },
            row! { "doc_id" => 2, "text" => "Hello, my little little hell" },
        ],
    );

    assert_eq!(
        graph.collect(&sources).unwrap(),
        vec![
            row! { "text" => "hell", "count" => 1 },
            row! { "text" => "world", "count" => 1 },
            row! { "text" => "hello", "count" => 2 },
            row! { "text" => "my", "count" => 2 },
            row! { "text" => "little", "count" => 3 },
        ]
    );
}

#[test]
fn word_count_reads_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.txt");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, r#"{{"doc_id": 1, "text": "hello, my little WORLD"}}"#).unwrap();
    writeln!(file, r#"{{"doc_id": 2, "text": "Hello, my little little hell"}}"#).unwrap();
    drop(file);

    let graph = word_count_graph(Input::file(&path), "text", "count");
    let counted = graph.collect(&Sources::new()).unwrap();
    assert_eq!(
        counted,
        vec![
            row! { "text" => "hell", "count" => 1 },
            row! { "text" => "world", "count" => 1 },
            row! { "text" => "hello", "count" => 2 },
            row! { "text" => "my", "count" => 2 },
            row! { "text" => "little", "count" => 3 },
        ]
    );
}

#[test]
fn inverted_index_scores_word_document_pairs() {
    let graph = inverted_index_graph(Input::source("texts"), "doc_id", "text", "tf_idf");
    let sources = Sources::new().rows("texts", docs());

    let scored: Vec<Row> = graph
        .collect(&sources)
        .unwrap()
        .into_iter()
        .sorted_by(|a, b| {
            let key = |row: &Row| (row.get("doc_id").cloned(), row.get("text").cloned());
            key(a).cmp(&key(b))
        })
        .collect();

    assert_scored(
        &scored,
        &[
            (1, "hello", 0.1351),
            (1, "world", 0.1351),
            (2, "little", 0.4054),
            (3, "little", 0.4054),
            (4, "hello", 0.1013),
            (4, "little", 0.2027),
            (5, "hello", 0.2703),
            (5, "world", 0.1351),
            (6, "world", 0.3243),
        ],
        "tf_idf",
    );
}

#[test]
fn inverted_index_runs_repeatedly_with_fresh_data() {
    let graph = inverted_index_graph(Input::source("texts"), "doc_id", "text", "tf_idf");

    let first = Sources::new().rows("texts", docs());
    assert_eq!(graph.collect(&first).unwrap().len(), 9);

    let second = Sources::new().rows(
        "texts",
        vec![
            row! { "doc_id" => 1, "text" => "solo" },
            row! { "doc_id" => 2, "text" => "solo" },
        ],
    );
    // Every document contains the only word, so idf is ln(2/2) = 0.
    let scored = graph.collect(&second).unwrap();
    assert_eq!(scored.len(), 2);
    for row in &scored {
        assert!(row.require_f64("tf_idf").unwrap().abs() < 1e-9);
    }

    // And the first sources still produce the first answer.
    assert_eq!(graph.collect(&first).unwrap().len(), 9);
}

#[test]
fn pmi_ranks_words_within_documents() {
    let graph = pmi_graph(Input::source("texts"), "doc_id", "text", "pmi");
    let sources = Sources::new().rows(
        "texts",
        vec![
            row! { "doc_id" => 1, "text" => "hello, little world" },
            row! { "doc_id" => 2, "text" => "little" },
            row! { "doc_id" => 3, "text" => "little little little" },
            row! { "doc_id" => 4, "text" => "little? hello little world" },
            row! { "doc_id" => 5, "text" => "HELLO HELLO! WORLD..." },
            row! { "doc_id" => 6, "text" => "world? world... world!!! WORLD!!! HELLO!!! HELLO!!!!!!!" },
        ],
    );

    let scored = graph.collect(&sources).unwrap();
    assert_scored(
        &scored,
        &[
            (3, "little", 0.9555),
            (4, "little", 0.9555),
            (5, "hello", 1.1786),
            (6, "world", 0.7731),
            (6, "hello", 0.0800),
        ],
        "pmi",
    );
}

#[test]
fn average_speed_by_weekday_and_hour() {
    let lengths = vec![
        row! { "start" => vec![37.84870228730142, 55.73853974696249],
               "end" => vec![37.8490418381989, 55.73832445777953],
               "edge_id" => 8414926848168493057i64 },
        row! { "start" => vec![37.524768467992544, 55.88785375468433],
               "end" => vec![37.52415172755718, 55.88807155843824],
               "edge_id" => 5342768494149337085i64 },
        row! { "start" => vec![37.56963176652789, 55.846845586784184],
               "end" => vec![37.57018438540399, 55.8469259692356],
               "edge_id" => 5123042926973124604i64 },
        row! { "start" => vec![37.41463478654623, 55.654487907886505],
               "end" => vec![37.41442892700434, 55.654839486815035],
               "edge_id" => 5726148664276615162i64 },
        row! { "start" => vec![37.584684155881405, 55.78285809606314],
               "end" => vec![37.58415022864938, 55.78177368734032],
               "edge_id" => 451916977441439743i64 },
        row! { "start" => vec![37.736429711803794, 55.62696328852326],
               "end" => vec![37.736344216391444, 55.626937723718584],
               "edge_id" => 7639557040160407543i64 },
        row! { "start" => vec![37.83196756616235, 55.76662947423756],
               "end" => vec![37.83191015012562, 55.766647034324706],
               "edge_id" => 1293255682152955894i64 },
    ];

    let times = vec![
        row! { "leave_time" => "20171020T112238.723000", "enter_time" => "20171020T112237.427000",
               "edge_id" => 8414926848168493057i64 },
        row! { "leave_time" => "20171011T145553.040000", "enter_time" => "20171011T145551.957000",
               "edge_id" => 8414926848168493057i64 },
        row! { "leave_time" => "20171020T090548.939000", "enter_time" => "20171020T090547.463000",
               "edge_id" => 8414926848168493057i64 },
        row! { "leave_time" => "20171024T144101.879000", "enter_time" => "20171024T144059.102000",
               "edge_id" => 8414926848168493057i64 },
        row! { "leave_time" => "20171022T131828.330000", "enter_time" => "20171022T131820.842000",
               "edge_id" => 5342768494149337085i64 },
        row! { "leave_time" => "20171014T134826.836000", "enter_time" => "20171014T134825.215000",
               "edge_id" => 5342768494149337085i64 },
        row! { "leave_time" => "20171010T060609.897000", "enter_time" => "20171010T060608.344000",
               "edge_id" => 5342768494149337085i64 },
        row! { "leave_time" => "20171027T082600.201000", "enter_time" => "20171027T082557.571000",
               "edge_id" => 5342768494149337085i64 },
    ];

    let graph = average_speed_graph(
        Input::source("travel_time"),
        Input::source("edge_length"),
        &SpeedColumns::default(),
    );
    let sources = Sources::new()
        .rows("travel_time", times)
        .rows("edge_length", lengths);

    let speeds: Vec<Row> = graph
        .collect(&sources)
        .unwrap()
        .into_iter()
        .sorted_by(|a, b| {
            let key = |row: &Row| (row.get("weekday").cloned(), row.get("hour").cloned());
            key(a).cmp(&key(b))
        })
        .collect();

    let expected = [
        ("Fri", 8, 62.2322),
        ("Fri", 9, 78.1070),
        ("Fri", 11, 88.9552),
        ("Sat", 13, 100.9690),
        ("Sun", 13, 21.8577),
        ("Tue", 6, 105.3901),
        ("Tue", 14, 41.5145),
        ("Wed", 14, 106.4505),
    ];

    assert_eq!(speeds.len(), expected.len());
    for (row, (weekday, hour, speed)) in speeds.iter().zip(&expected) {
        assert_eq!(row.get("weekday"), Some(&Value::from(*weekday)));
        assert_eq!(row.get("hour"), Some(&Value::Int(*hour)));
        let actual = row.require_f64("speed").unwrap();
        assert!(
            (actual - speed).abs() / speed < 1e-3,
            "{weekday} {hour}: {actual} vs {speed}"
        );
    }
}
