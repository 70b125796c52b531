use disclosure_harvester::config::DEFAULT_SUPPORTED_EXTENSIONS;
use disclosure_harvester::domain::{Category, FileRecord, GroupListing, RunMetadata, classify, group_key};

#[test]
fn classification_table() {
    let table = [
        (Category::Documents, &[".pdf", ".doc", ".docx", ".txt", ".rtf"][..]),
        (Category::Videos, &[".mp4", ".mov", ".avi", ".wmv", ".flv"][..]),
        (Category::Audio, &[".mp3", ".wav", ".m4a", ".aac", ".ogg"][..]),
        (Category::Images, &[".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff"][..]),
        (Category::Archives, &[".zip", ".rar", ".7z"][..]),
    ];
    for (category, extensions) in table {
        for extension in extensions {
            assert_eq!(classify(extension), category, "{extension}");
        }
    }
    assert_eq!(classify(".xyz"), Category::Other);
    assert_eq!(classify(""), Category::Other);
}

#[test]
fn every_default_extension_has_a_real_category() {
    for extension in DEFAULT_SUPPORTED_EXTENSIONS {
        assert_ne!(classify(extension), Category::Other, "{extension}");
    }
}

#[test]
fn record_derives_type_and_category_from_filename() {
    let record = FileRecord::new("EFTA00042.JPEG", "https://www.example.gov/EFTA00042.JPEG", 6);
    assert_eq!(record.file_type, ".jpeg");
    assert_eq!(record.category, Category::Images);
    assert!(!record.has_size());

    let bare = FileRecord::new("EFTA00043", "https://www.example.gov/EFTA00043", 6);
    assert_eq!(bare.file_type, "");
    assert_eq!(bare.category, Category::Other);
}

#[test]
fn record_serializes_with_portal_keys() {
    let mut record = FileRecord::new("EFTA0001.pdf", "https://www.example.gov/EFTA0001.pdf", 2);
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["data_set"], 2);
    assert_eq!(json["category"], "documents");
    assert!(json.get("file_size_bytes").is_none());
    assert!(json.get("file_size_mb").is_none());

    record.record_size(3 * 1024 * 1024);
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["file_size_bytes"], 3 * 1024 * 1024);
    assert_eq!(json["file_size_mb"], 3.0);
}

#[test]
fn metadata_keeps_processing_order() {
    let mut metadata = RunMetadata::new();
    metadata.insert(GroupListing::new(
        10,
        vec![FileRecord::new("EFTA10.pdf", "https://www.example.gov/EFTA10.pdf", 10)],
    ));
    metadata.insert(GroupListing::new(2, Vec::new()));

    let json = serde_json::to_string(&metadata).unwrap();
    let ten = json.find(&group_key(10)).unwrap();
    let two = json.find(&group_key(2)).unwrap();
    assert!(ten < two);
    assert!(json.contains(r#""data_set_2":[]"#));
    assert_eq!(metadata.total_records(), 1);
    assert!(!metadata.is_empty());
}

#[test]
fn category_counts_only_include_present_categories() {
    let listing = GroupListing::new(
        1,
        vec![
            FileRecord::new("EFTA1.pdf", "https://www.example.gov/EFTA1.pdf", 1),
            FileRecord::new("EFTA2.pdf", "https://www.example.gov/EFTA2.pdf", 1),
            FileRecord::new("EFTA3.wav", "https://www.example.gov/EFTA3.wav", 1),
        ],
    );
    let counts = listing.category_counts();
    assert_eq!(counts.len(), 2);
    assert_eq!(counts[&Category::Documents], 2);
    assert_eq!(counts[&Category::Audio], 1);
    assert_eq!(listing.key(), "data_set_1");
}
