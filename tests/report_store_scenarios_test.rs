//! End-to-end scenarios against a full `ReportStore`, each starting
//! from an empty root directory (`spec.md` §8).

#[cfg(test)]
mod report_store_tests {
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;

    use tempfile::tempdir;
    use xtrace_store::config::StoreConfig;
    use xtrace_store::store::ReportStore;
    use xtrace_store::task_id::TaskId;

    fn fast_config(root: impl Into<std::path::PathBuf>) -> StoreConfig {
        let mut config = StoreConfig::new(root);
        config.updater_interval = Duration::from_millis(10);
        config
    }

    fn report(task_id_hex: &str, title: Option<&str>, tags: &[&str]) -> String {
        let mut lines = vec![
            "X-Trace Report ver 1".to_string(),
            format!("X-Trace: {task_id_hex}00000001"),
        ];
        if let Some(title) = title {
            lines.push(format!("Title: {title}"));
        }
        for tag in tags {
            lines.push(format!("Tag: {tag}"));
        }
        lines.push(String::new());
        lines.join("\n")
    }

    fn settle() {
        thread::sleep(Duration::from_millis(100));
    }

    /// S1: single report with a title and two tags.
    #[test]
    fn s1_single_report() {
        let dir = tempdir().unwrap();
        let store = ReportStore::open(fast_config(dir.path())).unwrap();
        let tx = store.spawn_workers();

        tx.send(report("ABCDEF0123", Some("hello"), &["x", "y"])).unwrap();
        settle();

        let task_id = TaskId::parse("ABCDEF0123").unwrap();
        assert!(dir.path().join("AB").join("ABCDEF0123.txt").is_file());
        assert_eq!(store.query().num_reports_of(&task_id), Some(1));
        assert_eq!(
            store.query().by_title("hello").into_iter().next().unwrap().task_id,
            task_id
        );
        assert_eq!(
            store.query().get_tags_for_task(&task_id),
            HashSet::from(["x".to_string(), "y".to_string()])
        );
        store.shutdown();
    }

    /// S2: coalescing 1000 reports for the same task within a short window.
    #[test]
    fn s2_coalescing_many_reports() {
        let dir = tempdir().unwrap();
        let store = ReportStore::open(fast_config(dir.path())).unwrap();
        let tx = store.spawn_workers();

        for _ in 0..1000 {
            tx.send(report("FEDCBA9876", None, &[])).unwrap();
        }
        thread::sleep(Duration::from_millis(500));

        let task_id = TaskId::parse("FEDCBA9876").unwrap();
        assert_eq!(store.query().num_reports_of(&task_id), Some(1000));
        let blocks: Vec<_> = store.query().reports_by_task(&task_id).collect();
        assert_eq!(blocks.len(), 1000);
        store.shutdown();
    }

    /// S3: two tasks interleaved land under different shards.
    #[test]
    fn s3_two_tasks_interleaved() {
        let dir = tempdir().unwrap();
        let store = ReportStore::open(fast_config(dir.path())).unwrap();
        let tx = store.spawn_workers();

        for _ in 0..10 {
            tx.send(report("A1AAAA0001", None, &[])).unwrap();
            tx.send(report("B2BBBB0002", None, &[])).unwrap();
        }
        settle();

        assert_eq!(store.query().total_tasks(), 2);
        assert_eq!(store.query().total_reports(), 20);
        assert!(dir.path().join("A1").join("A1AAAA0001.txt").is_file());
        assert!(dir.path().join("B2").join("B2BBBB0002.txt").is_file());
        store.shutdown();
    }

    /// S4: tag union accumulates across separate reports for one task.
    #[test]
    fn s4_tag_union_across_reports() {
        let dir = tempdir().unwrap();
        let store = ReportStore::open(fast_config(dir.path())).unwrap();
        let tx = store.spawn_workers();

        tx.send(report("1234560000", None, &["a"])).unwrap();
        tx.send(report("1234560000", None, &["b"])).unwrap();
        tx.send(report("1234560000", None, &["a", "c"])).unwrap();
        settle();

        let task_id = TaskId::parse("1234560000").unwrap();
        assert_eq!(
            store.query().get_tags_for_task(&task_id),
            HashSet::from(["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(store.query().by_tag("b").len(), 1);
        assert!(store.query().by_tag("d").is_empty());
        store.shutdown();
    }

    /// S6: a report with no `X-Trace:` line is dropped, no file or row created.
    #[test]
    fn s6_malformed_report_is_dropped() {
        let dir = tempdir().unwrap();
        let store = ReportStore::open(fast_config(dir.path())).unwrap();
        let tx = store.spawn_workers();

        tx.send("X-Trace Report ver 1\nHost: foo\n\n".to_string()).unwrap();
        settle();

        assert_eq!(store.query().total_tasks(), 0);
        assert_eq!(store.query().total_reports(), 0);
        assert_eq!(store.stats().reports_dropped, 1);
        store.shutdown();
    }
}
