use itertools::Itertools;
use tempfile::NamedTempFile;

use crate::sqlite;
use crate::sqlite::connection::Connection;
use crate::sqlite::error::FormatError;
use crate::sqlite::record::CellValue;

use self::fixture::*;

/// Byte-level builder for small, valid database files. Pages are assembled
/// exactly as the format lays them out: cell content packed at the tail,
/// pointer array in logical order after the page header.
mod fixture {
    use std::io::Write;

    use tempfile::NamedTempFile;

    pub const LEAF_TABLE: u8 = 0x0d;
    pub const INTERIOR_TABLE: u8 = 0x05;
    pub const LEAF_INDEX: u8 = 0x0a;
    pub const INTERIOR_INDEX: u8 = 0x02;

    pub enum Field<'a> {
        Null,
        Int(i64),
        Text(&'a str),
        Blob(&'a [u8]),
    }

    pub fn varint(value: i64) -> Vec<u8> {
        let mut bits = value as u64;
        if bits >> 56 != 0 {
            let mut out = Vec::with_capacity(9);
            for i in (1..9).rev() {
                out.push(0x80 | ((bits >> (i * 7 + 1)) & 0x7f) as u8);
            }
            out.push((bits & 0xff) as u8);
            return out;
        }
        let mut groups = vec![(bits & 0x7f) as u8];
        bits >>= 7;
        while bits != 0 {
            groups.push(0x80 | (bits & 0x7f) as u8);
            bits >>= 7;
        }
        groups.reverse();
        groups
    }

    pub fn record(fields: &[Field]) -> Vec<u8> {
        let mut codes = Vec::new();
        let mut body = Vec::new();
        for field in fields {
            match field {
                Field::Null => codes.extend(varint(0)),
                Field::Int(v) => {
                    codes.extend(varint(6));
                    body.extend(v.to_be_bytes());
                }
                Field::Text(s) => {
                    codes.extend(varint(13 + 2 * s.len() as i64));
                    body.extend(s.as_bytes());
                }
                Field::Blob(b) => {
                    codes.extend(varint(12 + 2 * b.len() as i64));
                    body.extend(*b);
                }
            }
        }
        let header_size = codes.len() + 1;
        assert!(header_size < 128, "fixture records keep a one-byte header size");
        let mut out = varint(header_size as i64);
        out.extend(codes);
        out.extend(body);
        out
    }

    pub fn table_leaf_cell(row_id: i64, record: &[u8]) -> Vec<u8> {
        let mut out = varint(record.len() as i64);
        out.extend(varint(row_id));
        out.extend(record);
        out
    }

    pub fn table_interior_cell(left_child: u32, key: i64) -> Vec<u8> {
        let mut out = left_child.to_be_bytes().to_vec();
        out.extend(varint(key));
        out
    }

    pub fn index_leaf_cell(record: &[u8]) -> Vec<u8> {
        let mut out = varint(record.len() as i64);
        out.extend(record);
        out
    }

    pub fn index_interior_cell(left_child: u32, record: &[u8]) -> Vec<u8> {
        let mut out = left_child.to_be_bytes().to_vec();
        out.extend(varint(record.len() as i64));
        out.extend(record);
        out
    }

    pub struct PageSpec {
        pub page_type: u8,
        pub right_most: Option<u32>,
        pub cells: Vec<Vec<u8>>,
    }

    pub fn build_page(page_size: usize, header_offset: usize, spec: &PageSpec) -> Vec<u8> {
        let mut page = vec![0u8; page_size];
        let mut top = page_size;
        let mut pointers = Vec::new();
        for cell in &spec.cells {
            top -= cell.len();
            page[top..top + cell.len()].copy_from_slice(cell);
            pointers.push(top as u16);
        }

        let h = header_offset;
        page[h] = spec.page_type;
        page[h + 3..h + 5].copy_from_slice(&(spec.cells.len() as u16).to_be_bytes());
        page[h + 5..h + 7].copy_from_slice(&(top as u16).to_be_bytes());
        let mut pointer_at = h + 8;
        if let Some(right_most) = spec.right_most {
            page[h + 8..h + 12].copy_from_slice(&right_most.to_be_bytes());
            pointer_at = h + 12;
        }
        for pointer in pointers {
            page[pointer_at..pointer_at + 2].copy_from_slice(&pointer.to_be_bytes());
            pointer_at += 2;
        }
        assert!(top >= pointer_at, "fixture page overflowed");
        page
    }

    pub fn schema_cell(
        row_id: i64,
        kind: &str,
        name: &str,
        tbl_name: &str,
        root_page: i64,
        sql: &str,
    ) -> Vec<u8> {
        table_leaf_cell(
            row_id,
            &record(&[
                Field::Text(kind),
                Field::Text(name),
                Field::Text(tbl_name),
                Field::Int(root_page),
                Field::Text(sql),
            ]),
        )
    }

    /// Concatenate the pages and stamp the 100-byte file header over the
    /// start of page 1.
    pub fn build_db(page_size: usize, pages: Vec<Vec<u8>>) -> Vec<u8> {
        let mut out = Vec::with_capacity(page_size * pages.len());
        for page in &pages {
            assert_eq!(page.len(), page_size);
            out.extend(page);
        }
        out[..16].copy_from_slice(b"SQLite format 3\0");
        out[16..18].copy_from_slice(&(page_size as u16).to_be_bytes());
        out[18] = 1;
        out[19] = 1;
        out[20] = 0;
        out
    }

    pub fn write_db(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("create fixture file");
        file.write_all(bytes).expect("write fixture file");
        file.flush().expect("flush fixture file");
        file
    }
}

fn open_fixture(file: &NamedTempFile) -> Connection {
    sqlite::open(file.path().to_str().expect("fixture path is utf-8")).expect("open fixture")
}

/// Single-level database: one fruit table with an index on `color`, the
/// `sqlite_sequence` bookkeeping table, and a table holding a blob.
fn orchard_db() -> NamedTempFile {
    let page_size = 1024;
    let apple = |row_id, name: &str, color: &str| {
        table_leaf_cell(
            row_id,
            &record(&[Field::Null, Field::Text(name), Field::Text(color)]),
        )
    };
    let page2 = build_page(
        page_size,
        0,
        &PageSpec {
            page_type: LEAF_TABLE,
            right_most: None,
            cells: vec![
                apple(1, "Granny Smith", "Green"),
                apple(2, "Fuji", "Red"),
                apple(3, "Honeycrisp", "Red"),
                apple(4, "Golden Delicious", "Yellow"),
            ],
        },
    );
    let page3 = build_page(
        page_size,
        0,
        &PageSpec {
            page_type: LEAF_TABLE,
            right_most: None,
            cells: vec![table_leaf_cell(
                1,
                &record(&[Field::Text("apples"), Field::Int(4)]),
            )],
        },
    );
    // index entries sorted by (key, row-id)
    let entry = |color: &str, row_id| {
        index_leaf_cell(&record(&[Field::Text(color), Field::Int(row_id)]))
    };
    let page4 = build_page(
        page_size,
        0,
        &PageSpec {
            page_type: LEAF_INDEX,
            right_most: None,
            cells: vec![
                entry("Green", 1),
                entry("Red", 2),
                entry("Red", 3),
                entry("Yellow", 4),
            ],
        },
    );
    let page5 = build_page(
        page_size,
        0,
        &PageSpec {
            page_type: LEAF_TABLE,
            right_most: None,
            cells: vec![table_leaf_cell(
                1,
                &record(&[Field::Null, Field::Blob(&[0xde, 0xad, 0xbe, 0xef])]),
            )],
        },
    );
    let page1 = build_page(
        page_size,
        100,
        &PageSpec {
            page_type: LEAF_TABLE,
            right_most: None,
            cells: vec![
                schema_cell(
                    1,
                    "table",
                    "apples",
                    "apples",
                    2,
                    "CREATE TABLE apples (id integer primary key autoincrement, name text, color text)",
                ),
                schema_cell(
                    2,
                    "table",
                    "sqlite_sequence",
                    "sqlite_sequence",
                    3,
                    "CREATE TABLE sqlite_sequence(name,seq)",
                ),
                schema_cell(
                    3,
                    "index",
                    "idx_apples_color",
                    "apples",
                    4,
                    "CREATE INDEX idx_apples_color ON apples (color)",
                ),
                schema_cell(
                    4,
                    "table",
                    "attachments",
                    "attachments",
                    5,
                    "CREATE TABLE attachments (id integer primary key, data blob)",
                ),
            ],
        },
    );
    write_db(&build_db(
        page_size,
        vec![page1, page2, page3, page4, page5],
    ))
}

/// Two-level database: a table B-tree and an index B-tree that both have an
/// interior root, with duplicate index keys spanning the interior boundary.
fn registry_db() -> NamedTempFile {
    let page_size = 4096;
    let company = |row_id, name: &str, country: &str| {
        table_leaf_cell(
            row_id,
            &record(&[Field::Null, Field::Text(name), Field::Text(country)]),
        )
    };
    let page2 = build_page(
        page_size,
        0,
        &PageSpec {
            page_type: INTERIOR_TABLE,
            right_most: Some(4),
            cells: vec![table_interior_cell(3, 3)],
        },
    );
    let page3 = build_page(
        page_size,
        0,
        &PageSpec {
            page_type: LEAF_TABLE,
            right_most: None,
            cells: vec![
                company(1, "acme", "albania"),
                company(2, "bonn", "france"),
                company(3, "cobalt", "eritrea"),
            ],
        },
    );
    let page4 = build_page(
        page_size,
        0,
        &PageSpec {
            page_type: LEAF_TABLE,
            right_most: None,
            cells: vec![
                company(5, "dynamo", "eritrea"),
                company(7, "ember", "eritrea"),
                company(9, "fjord", "zambia"),
            ],
        },
    );
    let entry = |country: &str, row_id| {
        record(&[Field::Text(country), Field::Int(row_id)])
    };
    let page5 = build_page(
        page_size,
        0,
        &PageSpec {
            page_type: INTERIOR_INDEX,
            right_most: Some(7),
            cells: vec![index_interior_cell(6, &entry("eritrea", 5))],
        },
    );
    let page6 = build_page(
        page_size,
        0,
        &PageSpec {
            page_type: LEAF_INDEX,
            right_most: None,
            cells: vec![
                index_leaf_cell(&entry("albania", 1)),
                index_leaf_cell(&entry("eritrea", 3)),
            ],
        },
    );
    let page7 = build_page(
        page_size,
        0,
        &PageSpec {
            page_type: LEAF_INDEX,
            right_most: None,
            cells: vec![
                index_leaf_cell(&entry("eritrea", 7)),
                index_leaf_cell(&entry("france", 2)),
                index_leaf_cell(&entry("zambia", 9)),
            ],
        },
    );
    let page1 = build_page(
        page_size,
        100,
        &PageSpec {
            page_type: LEAF_TABLE,
            right_most: None,
            cells: vec![
                schema_cell(
                    1,
                    "table",
                    "companies",
                    "companies",
                    2,
                    "CREATE TABLE companies (id integer primary key, name text, country text)",
                ),
                schema_cell(
                    2,
                    "index",
                    "idx_companies_country",
                    "companies",
                    5,
                    "CREATE INDEX idx_companies_country ON companies (country)",
                ),
            ],
        },
    );
    write_db(&build_db(
        page_size,
        vec![page1, page2, page3, page4, page5, page6, page7],
    ))
}

#[test]
fn dbinfo_reports_page_size_and_schema_cell_count() {
    let file = orchard_db();
    let conn = open_fixture(&file);
    assert_eq!(conn.header().page_size, 1024);
    assert_eq!(conn.schema_entry_count(), 4);

    let file = registry_db();
    let conn = open_fixture(&file);
    assert_eq!(conn.header().page_size, 4096);
    assert_eq!(conn.schema_entry_count(), 2);
}

#[test]
fn tables_listing_excludes_sqlite_sequence() {
    let file = orchard_db();
    let conn = open_fixture(&file);
    assert_eq!(conn.user_table_names(), vec!["apples", "attachments"]);
}

#[test]
fn count_star_counts_leaf_cells() {
    let file = orchard_db();
    let conn = open_fixture(&file);
    assert_eq!(
        conn.execute_query("SELECT COUNT(*) FROM apples").unwrap(),
        vec!["4"]
    );
}

#[test]
fn count_star_respects_the_predicate() {
    let file = orchard_db();
    let conn = open_fixture(&file);
    assert_eq!(
        conn.execute_query("SELECT COUNT(*) FROM apples WHERE color = 'Red'")
            .unwrap(),
        vec!["2"]
    );
}

#[test]
fn projection_follows_on_disk_row_order() {
    let file = orchard_db();
    let conn = open_fixture(&file);
    assert_eq!(
        conn.execute_query("SELECT name FROM apples").unwrap(),
        vec!["Granny Smith", "Fuji", "Honeycrisp", "Golden Delicious"]
    );
}

#[test]
fn rowid_alias_column_reads_back_as_the_row_id() {
    let file = orchard_db();
    let conn = open_fixture(&file);
    assert_eq!(
        conn.execute_query("SELECT id, name FROM apples").unwrap(),
        vec![
            "1|Granny Smith",
            "2|Fuji",
            "3|Honeycrisp",
            "4|Golden Delicious"
        ]
    );
}

#[test]
fn scan_plan_filters_on_equality() {
    let file = orchard_db();
    let conn = open_fixture(&file);
    assert_eq!(
        conn.execute_query("SELECT id, name FROM apples WHERE name = 'Fuji'")
            .unwrap(),
        vec!["2|Fuji"]
    );
}

#[test]
fn scan_predicate_coerces_between_int_and_text() {
    let file = orchard_db();
    let conn = open_fixture(&file);
    assert_eq!(
        conn.execute_query("SELECT name FROM apples WHERE id = 2")
            .unwrap(),
        vec!["Fuji"]
    );
    assert_eq!(
        conn.execute_query("SELECT name FROM apples WHERE id = '2'")
            .unwrap(),
        vec!["Fuji"]
    );
}

#[test]
fn indexed_plan_matches_sequential_scan() {
    let file = orchard_db();
    let conn = open_fixture(&file);
    // color is indexed, so this runs through the index
    let indexed = conn
        .execute_query("SELECT name FROM apples WHERE color = 'Red'")
        .unwrap();
    assert_eq!(indexed, vec!["Fuji", "Honeycrisp"]);

    // the same rows, collected by walking the table
    let tree = conn.get_tree("apples").unwrap();
    let scanned: Vec<String> = tree
        .row_reader(conn.database())
        .map(|row| row.unwrap())
        .filter(|row| {
            row.read_column("color").unwrap() == CellValue::String("Red".into())
        })
        .map(|row| match row.read_column("name").unwrap() {
            CellValue::String(s) => s,
            other => panic!("expected text, found {other:?}"),
        })
        .collect_vec();
    assert_eq!(indexed, scanned);
}

#[test]
fn multi_level_scan_yields_ascending_row_ids() {
    let file = registry_db();
    let conn = open_fixture(&file);
    assert_eq!(
        conn.execute_query("SELECT id, name FROM companies").unwrap(),
        vec![
            "1|acme",
            "2|bonn",
            "3|cobalt",
            "5|dynamo",
            "7|ember",
            "9|fjord"
        ]
    );
    assert_eq!(
        conn.execute_query("SELECT COUNT(*) FROM companies").unwrap(),
        vec!["6"]
    );
}

#[test]
fn index_lookup_collects_matches_across_interior_cells() {
    let file = registry_db();
    let conn = open_fixture(&file);
    let schema = conn
        .database()
        .get_index_on("companies", "country")
        .expect("index exists");
    let index = crate::sqlite::index_btree::IndexBTree::new(schema).unwrap();

    let mut ids = index
        .find_row_ids(conn.database(), &CellValue::String("eritrea".into()))
        .unwrap();
    ids.sort_unstable();
    assert_eq!(ids, vec![3, 5, 7]);

    assert_eq!(
        index
            .find_row_ids(conn.database(), &CellValue::String("albania".into()))
            .unwrap(),
        vec![1]
    );
    assert_eq!(
        index
            .find_row_ids(conn.database(), &CellValue::String("zambia".into()))
            .unwrap(),
        vec![9]
    );
    assert!(index
        .find_row_ids(conn.database(), &CellValue::String("norway".into()))
        .unwrap()
        .is_empty());
}

#[test]
fn indexed_equality_matches_full_scan_on_multi_level_trees() {
    let file = registry_db();
    let conn = open_fixture(&file);
    let indexed = conn
        .execute_query("SELECT name FROM companies WHERE country = 'eritrea'")
        .unwrap();
    assert_eq!(indexed, vec!["cobalt", "dynamo", "ember"]);

    let tree = conn.get_tree("companies").unwrap();
    let scanned: Vec<String> = tree
        .row_reader(conn.database())
        .map(|row| row.unwrap())
        .filter(|row| {
            row.read_column("country").unwrap() == CellValue::String("eritrea".into())
        })
        .map(|row| match row.read_column("name").unwrap() {
            CellValue::String(s) => s,
            other => panic!("expected text, found {other:?}"),
        })
        .collect_vec();
    assert_eq!(indexed, scanned);
}

#[test]
fn fetch_rows_returns_one_row_per_existing_id_in_order() {
    let file = registry_db();
    let conn = open_fixture(&file);
    let tree = conn.get_tree("companies").unwrap();

    let rows = tree.fetch_rows(conn.database(), &[1, 5, 9]).unwrap();
    assert_eq!(rows.iter().map(|r| r.row_id).collect_vec(), vec![1, 5, 9]);

    // ids that do not exist are skipped, not errors
    let rows = tree.fetch_rows(conn.database(), &[4, 6, 8]).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn childless_interior_page_routes_through_the_right_most_pointer() {
    let page_size = 1024;
    let page2 = build_page(
        page_size,
        0,
        &PageSpec {
            page_type: INTERIOR_TABLE,
            right_most: Some(3),
            cells: vec![],
        },
    );
    let page3 = build_page(
        page_size,
        0,
        &PageSpec {
            page_type: LEAF_TABLE,
            right_most: None,
            cells: vec![
                table_leaf_cell(1, &record(&[Field::Null, Field::Text("first")])),
                table_leaf_cell(2, &record(&[Field::Null, Field::Text("second")])),
            ],
        },
    );
    let page1 = build_page(
        page_size,
        100,
        &PageSpec {
            page_type: LEAF_TABLE,
            right_most: None,
            cells: vec![schema_cell(
                1,
                "table",
                "narrow",
                "narrow",
                2,
                "CREATE TABLE narrow (id integer primary key, label text)",
            )],
        },
    );
    let file = write_db(&build_db(page_size, vec![page1, page2, page3]));
    let conn = open_fixture(&file);

    assert_eq!(
        conn.execute_query("SELECT COUNT(*) FROM narrow").unwrap(),
        vec!["2"]
    );
    let tree = conn.get_tree("narrow").unwrap();
    let rows = tree.fetch_rows(conn.database(), &[2]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].row_id, 2);
}

#[test]
fn blob_projection_is_unsupported() {
    let file = orchard_db();
    let conn = open_fixture(&file);
    let err = conn
        .execute_query("SELECT data FROM attachments")
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FormatError>(),
        Some(FormatError::Unsupported(_))
    ));
}

#[test]
fn unknown_tables_and_columns_are_schema_missing() {
    let file = orchard_db();
    let conn = open_fixture(&file);

    let err = conn.execute_query("SELECT name FROM pears").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FormatError>(),
        Some(FormatError::SchemaMissing(_))
    ));

    let err = conn.execute_query("SELECT flavor FROM apples").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FormatError>(),
        Some(FormatError::SchemaMissing(_))
    ));
}

#[test]
fn unknown_page_type_surfaces_as_a_format_error() {
    let page_size = 512;
    let mut page2 = vec![0u8; page_size];
    page2[0] = 0x07;
    let page1 = build_page(
        page_size,
        100,
        &PageSpec {
            page_type: LEAF_TABLE,
            right_most: None,
            cells: vec![schema_cell(
                1,
                "table",
                "broken",
                "broken",
                2,
                "CREATE TABLE broken (id integer primary key)",
            )],
        },
    );
    let file = write_db(&build_db(page_size, vec![page1, page2]));
    let conn = open_fixture(&file);

    let err = conn.execute_query("SELECT COUNT(*) FROM broken").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FormatError>(),
        Some(FormatError::UnknownPageType(0x07))
    ));
}

#[test]
fn truncated_database_file_fails_to_open() {
    let bytes = build_db(
        512,
        vec![build_page(
            512,
            100,
            &PageSpec {
                page_type: LEAF_TABLE,
                right_most: None,
                cells: vec![],
            },
        )],
    );
    // cut the file short of a full page
    let file = write_db(&bytes[..300]);
    let result = sqlite::open(file.path().to_str().unwrap());
    assert!(result.is_err());
}
