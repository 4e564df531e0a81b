//! End-to-end runs over temp files: corpus → dictionary → neighborhood →
//! artifacts → queries.

use std::path::PathBuf;

use word2neigh_core::lexicon::{EMIT_COUNT, EMIT_DOC_COUNT, EMIT_TFIDF};
use word2neigh_core::pipeline::{self, AnalyzeOptions};
use word2neigh_core::query::Metric;
use word2neigh_core::{Lexicon, NeighborMatrix, QueryEngine, SortOrder};

fn write_file(dir: &tempfile::TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn generated_neighborhood_round_trips_through_binary() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_file(&dir, "tiny.txt", "a b a c a b\n");
    let missing_dict = dir.path().join("tiny.lex");
    let bin = dir.path().join("tiny.neighbors");
    let bin2 = dir.path().join("tiny2.neighbors");

    let opts = AnalyzeOptions {
        width: 2,
        ..Default::default()
    };
    let (lex, nm) = pipeline::build_neighborhood(&corpus, &missing_dict, None, &opts).unwrap();
    let a = lex.find("a").unwrap();
    let b = lex.find("b").unwrap();
    let c = lex.find("c").unwrap();
    assert_eq!(nm.row(a, 64), vec![(b, 3), (c, 2)]);

    nm.write_binary(&bin).unwrap();
    let back = NeighborMatrix::read_binary(&bin).unwrap();
    assert_eq!(back.row(a, 64), nm.row(a, 64));
    assert_eq!(back.row(b, 64), nm.row(b, 64));
    assert_eq!(back.used(), nm.used());

    back.write_binary(&bin2).unwrap();
    assert_eq!(std::fs::read(&bin).unwrap(), std::fs::read(&bin2).unwrap());
}

#[test]
fn dictionary_then_lookup_build_then_query() {
    let dir = tempfile::tempdir().unwrap();
    // Three documents: "sun" saturates document frequency (and falls to the
    // TF·IDF cut on export), each document carries its own trio of words
    // repeated past the exporter's count cut.
    fn doc(words: &str) -> String {
        let mut out = String::from("# newdoc\n");
        for w in words.split(' ') {
            out.push_str(&format!("1\t{w}\t{w}\tNOUN\n"));
        }
        out
    }
    let corpus = write_file(
        &dir,
        "c.conllu",
        &format!(
            "{}{}{}",
            doc("sun moon star dust moon star dust moon star dust"),
            doc("sun comet nova rock comet nova rock comet nova rock"),
            doc("sun"),
        ),
    );
    let dict = dir.path().join("c.lex");
    let neighbors = dir.path().join("c.neighbors");

    let opts = AnalyzeOptions {
        format: word2neigh_core::CorpusFormat::Conllu(word2neigh_core::ColumnSelect::LEMMA),
        width: 2,
        ..Default::default()
    };
    let exported = pipeline::build_dictionary(
        &corpus,
        &dict,
        None,
        &opts,
        SortOrder::Alpha,
        EMIT_COUNT | EMIT_DOC_COUNT | EMIT_TFIDF,
    )
    .unwrap();
    assert_eq!(exported, 6, "the per-document trios clear the cuts");

    let (lex, nm) = pipeline::build_neighborhood(&corpus, &dict, None, &opts).unwrap();
    // lookup mode: the saturating word was cut from the dictionary
    assert!(lex.find("sun").is_none());
    nm.write_binary(&neighbors).unwrap();

    let mut qlex = Lexicon::new();
    qlex.import(&dict).unwrap();
    let qnm = NeighborMatrix::read_binary(&neighbors).unwrap();
    let engine = QueryEngine::new(&qlex, &qnm, 64);

    let similar = engine.similar("moon", 16, Metric::Share).unwrap();
    assert!(!similar.is_empty());
    // moon and dust share the "star" column, moon and star share "dust";
    // the dust overlap is larger.
    assert_eq!(similar[0].0, "dust");
    assert!(engine.similar("pluto", 16, Metric::Share).is_none());

    let ctx = engine.context(&["moon", "star"]);
    assert!(ctx.missing.is_empty());
    let moon = qlex.find("moon").unwrap();
    let star = qlex.find("star").unwrap();
    let dust = qlex.find("dust").unwrap();
    assert_eq!(ctx.matches.first().map(|m| m.0), Some(dust));
    for (id, _) in &ctx.matches {
        assert!(qnm.get(*id, moon) > 1);
        assert!(qnm.get(*id, star) > 1);
    }
}

#[test]
fn text_artifact_lists_neighbors_in_area_order() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_file(&dir, "t.txt", "x y x z x y\n");
    let dict = dir.path().join("t.lex");

    let opts = AnalyzeOptions {
        width: 2,
        ..Default::default()
    };
    let (lex, nm) = pipeline::build_neighborhood(&corpus, &dict, None, &opts).unwrap();
    let out = dir.path().join("t.txt.neighbors.txt");
    nm.write_text(&out, &lex, 64).unwrap();
    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.lines().count() >= 3);
    assert!(text.starts_with("x: y_3, z_2"));
    assert!(text.contains("\r\n"));
}

#[test]
fn stopword_file_drives_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_file(&dir, "s.txt", "the cat sat the mat\n");
    let stops = write_file(&dir, "s.stop", "the\r\n");
    let dict = dir.path().join("s.lex");

    let stopwords = pipeline::load_stopwords(&stops).unwrap();
    let opts = AnalyzeOptions {
        width: 2,
        ..Default::default()
    };
    let (lex, nm) =
        pipeline::build_neighborhood(&corpus, &dict, Some(&stopwords), &opts).unwrap();
    assert!(lex.find("the").is_none());
    let cat = lex.find("cat").unwrap();
    let sat = lex.find("sat").unwrap();
    let mat = lex.find("mat").unwrap();
    assert_eq!(nm.get(sat, cat), 1);
    assert_eq!(nm.get(mat, cat), 0);
}

#[test]
fn bigram_rows_differ_from_unigram_rows() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_file(&dir, "b.txt", "new york city new york\n");
    // Lookup-mode dictionary that already carries the bigrams.
    let dict = write_file(
        &dir,
        "b.lex",
        "new\t2\t1\r\nyork\t2\t1\r\ncity\t1\t1\r\nnew_york\t2\t1\r\nyork_city\t1\t1\r\n",
    );

    let opts = AnalyzeOptions {
        width: 2,
        bigrams: true,
        ..Default::default()
    };
    let (lex, nm) = pipeline::build_neighborhood(&corpus, &dict, None, &opts).unwrap();
    for w in ["new", "york", "city", "new_york", "york_city"] {
        assert!(lex.find(w).is_some(), "missing {w}");
    }
    let new = lex.find("new").unwrap();
    let ny = lex.find("new_york").unwrap();
    assert_ne!(nm.row(ny, 64), nm.row(new, 64));
}
