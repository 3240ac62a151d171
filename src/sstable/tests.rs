use super::*;
use tempfile::TempDir;

fn snapshot(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn write_then_search_finds_every_key() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("sst_0000.txt");
    let snap = snapshot(&[("b", "2"), ("a", "1"), ("c", "3")]);
    let sst = SstSegment::write_from_memtable(&path, &snap).unwrap();

    assert_eq!(sst.search("a").unwrap().as_deref(), Some("1"));
    assert_eq!(sst.search("b").unwrap().as_deref(), Some("2"));
    assert_eq!(sst.search("c").unwrap().as_deref(), Some("3"));
    assert_eq!(sst.search("z").unwrap(), None);
}

#[test]
fn write_sorts_lines_ascending_by_key() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("sst_0000.txt");
    let snap = snapshot(&[("z", "26"), ("a", "1"), ("m", "13")]);
    SstSegment::write_from_memtable(&path, &snap).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let keys: Vec<&str> = contents
        .lines()
        .map(|line| line.split('\t').next().unwrap())
        .collect();
    assert_eq!(keys, vec!["a", "m", "z"]);
}

#[test]
fn write_records_bounds_immediately() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("sst_0000.txt");
    let snap = snapshot(&[("b", "2"), ("a", "1"), ("c", "3")]);
    let sst = SstSegment::write_from_memtable(&path, &snap).unwrap();

    assert_eq!(sst.bounds(), Some(("a".to_string(), "c".to_string())));
}

#[test]
fn search_on_wrapped_segment_lazily_loads_bounds() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("sst_0000.txt");
    let snap = snapshot(&[("b", "2"), ("a", "1"), ("c", "3")]);
    SstSegment::write_from_memtable(&path, &snap).unwrap();

    let reopened = SstSegment::new(&path);
    assert_eq!(reopened.bounds(), None);
    assert_eq!(reopened.search("b").unwrap().as_deref(), Some("2"));
    assert_eq!(reopened.bounds(), Some(("a".to_string(), "c".to_string())));
}

#[test]
fn search_prunes_keys_outside_bounds_without_reading_outside_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("sst_0000.txt");
    let snap = snapshot(&[("m", "1"), ("n", "2"), ("o", "3")]);
    let sst = SstSegment::write_from_memtable(&path, &snap).unwrap();

    assert_eq!(sst.search("a").unwrap(), None);
    assert_eq!(sst.search("zzz").unwrap(), None);
}

#[test]
fn search_missing_file_returns_none_not_error() {
    let tmp = TempDir::new().unwrap();
    let sst = SstSegment::new(tmp.path().join("sst_9999.txt"));
    assert_eq!(sst.search("anything").unwrap(), None);
}

#[test]
fn search_tombstone_value_returned_verbatim() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("sst_0000.txt");
    let snap = snapshot(&[("k", crate::memtable::TOMBSTONE)]);
    let sst = SstSegment::write_from_memtable(&path, &snap).unwrap();

    assert_eq!(
        sst.search("k").unwrap().as_deref(),
        Some(crate::memtable::TOMBSTONE)
    );
}

#[test]
fn search_skips_malformed_lines() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("sst_0000.txt");
    std::fs::write(&path, "a\t1\nmalformed-no-tab\nb\t2\n").unwrap();

    let sst = SstSegment::new(&path);
    assert_eq!(sst.search("a").unwrap().as_deref(), Some("1"));
    assert_eq!(sst.search("b").unwrap().as_deref(), Some("2"));
    // bounds should have been derived only from the well-formed lines
    assert_eq!(sst.bounds(), Some(("a".to_string(), "b".to_string())));
}

#[test]
fn search_reports_corruption_for_out_of_order_keys() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("sst_0000.txt");
    std::fs::write(&path, "b\t1\na\t2\n").unwrap();

    let sst = SstSegment::new(&path);
    let err = sst.search("a").unwrap_err();
    assert!(matches!(err, SstError::Corruption { .. }));
}

#[test]
fn single_entry_segment_has_equal_min_and_max() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("sst_0000.txt");
    let snap = snapshot(&[("only", "1")]);
    let sst = SstSegment::write_from_memtable(&path, &snap).unwrap();
    assert_eq!(sst.bounds(), Some(("only".to_string(), "only".to_string())));
}
