use std::sync::Arc;

use super::*;
use crate::matrix::MatrixBlock;
use crate::operators::{AggregateFn, ScalarFn};

fn sample() -> MatrixBlock {
    MatrixBlock::from_rows(&[
        vec![1.0, 0.0, 3.0],
        vec![1.0, 0.0, 3.0],
        vec![0.0, 0.0, 0.0],
        vec![2.0, 5.0, 3.0],
        vec![1.0, 0.0, 3.0],
        vec![0.0, 0.0, 0.0],
    ])
    .expect("rows")
}

fn all_encodings(m: &MatrixBlock, columns: &[usize]) -> Vec<ColumnGroup> {
    let bitmap = ColumnBitmap::extract(&ColumnSource::row_major(m), columns, None);
    let rows = m.rows();
    vec![
        ColumnGroup::Uncompressed(UncompressedGroup::from_source(
            &Arc::new(m.clone()),
            columns.to_vec(),
        )),
        ColumnGroup::Ddc(DdcGroup::from_bitmap(columns.to_vec(), rows, &bitmap).expect("ddc")),
        ColumnGroup::OffsetList(OleGroup::from_bitmap(columns.to_vec(), rows, bitmap.clone())),
        ColumnGroup::RunLength(RleGroup::from_bitmap(columns.to_vec(), rows, bitmap)),
    ]
}

fn roundtrip(group: &ColumnGroup) -> ColumnGroup {
    let mut buf = Vec::new();
    group
        .write_to(&mut buf, &mut SharedDictionarySlot::new(false))
        .expect("write");
    assert_eq!(buf.len(), group.serialized_size(&mut SharedDictionarySlot::new(false)));
    let mut slice = buf.as_slice();
    let read = ColumnGroup::read_from(&mut slice, &mut SharedDictionarySlot::new(false)).expect("read");
    assert!(slice.is_empty(), "trailing bytes after {}", group.kind());
    read
}

#[test]
fn test_every_encoding_decompresses_exactly() {
    // Arrange
    let m = sample();
    let expected = m.to_row_major();

    for group in all_encodings(&m, &[0, 1, 2]) {
        // Act
        let mut dense = vec![0.0; 18];
        group.decompress_to_dense(&mut dense, 3, 0, 6);

        // Assert
        assert_eq!(dense, expected, "{}", group.kind());
        for r in 0..6 {
            for c in 0..3 {
                assert_eq!(group.get(r, c), m.get(r, c), "{} at ({r},{c})", group.kind());
            }
        }
        assert_eq!(group.nnz(), m.nnz());
    }
}

#[test]
fn test_encoding_kinds_and_value_counts() {
    let m = sample();
    let kinds: Vec<EncodingKind> = all_encodings(&m, &[0, 2]).iter().map(ColumnGroup::kind).collect();
    assert_eq!(
        kinds,
        vec![
            EncodingKind::Uncompressed,
            EncodingKind::Ddc8,
            EncodingKind::OffsetList,
            EncodingKind::RunLength
        ]
    );

    let groups = all_encodings(&m, &[0, 2]);
    // (1,3) (2,3) plus the explicit zero tuple for DDC
    assert_eq!(groups[1].num_values(), 3);
    assert_eq!(groups[2].num_values(), 2);
    assert_eq!(groups[3].num_values(), 2);
}

#[test]
fn test_partial_column_group_reads_global_columns() {
    let m = sample();
    for group in all_encodings(&m, &[1, 2]) {
        assert_eq!(group.get(3, 1), 5.0);
        assert_eq!(group.get(3, 2), 3.0);
        assert_eq!(group.get(3, 0), 0.0, "column 0 is not in the group");

        let mut column = vec![0.0; 6];
        group.decompress_column(2, &mut column);
        assert_eq!(column, vec![3.0, 3.0, 0.0, 3.0, 3.0, 0.0]);
    }
}

#[test]
fn test_sparse_decompression_fills_rows() {
    let m = sample();
    for group in all_encodings(&m, &[0, 1, 2]) {
        let mut rows = vec![crate::matrix::SparseRow::default(); 2];
        group.decompress_to_sparse(&mut rows, 3, 5);
        assert_eq!(rows[0].indices(), &[0, 1, 2], "{}", group.kind());
        assert_eq!(rows[0].values(), &[2.0, 5.0, 3.0]);
        assert_eq!(rows[1].values(), &[1.0, 3.0]);
    }
}

#[test]
fn test_right_and_left_multiply_match_dense() {
    // Arrange
    let m = sample();
    let v = [2.0, -1.0, 0.5];
    let u = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

    for group in all_encodings(&m, &[0, 1, 2]) {
        // Act
        let mut right = vec![0.0; 4];
        group.right_mult(&v, &mut right, 2, 6);
        let mut left = vec![0.0; 3];
        group.left_mult(&u, &mut left);

        // Assert
        assert_eq!(right, vec![0.0, 0.5, 3.5, 0.0], "{}", group.kind());
        assert_eq!(left, vec![1.0 + 2.0 + 8.0 + 5.0, 20.0, 3.0 * 12.0], "{}", group.kind());
    }
}

#[test]
fn test_aggregates_match_dense() {
    let m = sample();
    let cases = [
        (AggregateFn::Sum, IndexFunction::ReduceRow, vec![5.0, 5.0, 12.0]),
        (AggregateFn::Min, IndexFunction::ReduceRow, vec![0.0, 0.0, 0.0]),
        (AggregateFn::Max, IndexFunction::ReduceRow, vec![2.0, 5.0, 3.0]),
        (AggregateFn::Sum, IndexFunction::ReduceAll, vec![22.0]),
        (AggregateFn::SumSq, IndexFunction::ReduceAll, vec![68.0]),
        (AggregateFn::Min, IndexFunction::ReduceAll, vec![0.0]),
        (
            AggregateFn::Sum,
            IndexFunction::ReduceCol,
            vec![4.0, 4.0, 0.0, 10.0, 4.0, 0.0],
        ),
    ];
    for (function, index, expected) in cases {
        for group in all_encodings(&m, &[0, 1, 2]) {
            let mut buf = AggregateBuffer::new(function, expected.len());
            group.aggregate(&mut buf, index, 0, 6);
            assert_eq!(buf.finish(), expected, "{} {function:?} {index:?}", group.kind());
        }
    }
}

#[test]
fn test_aggregate_over_row_range() {
    let m = sample();
    for group in all_encodings(&m, &[0]) {
        let mut buf = AggregateBuffer::new(AggregateFn::Max, 1);
        group.aggregate(&mut buf, IndexFunction::ReduceAll, 4, 6);
        assert_eq!(buf.finish(), vec![1.0], "{}", group.kind());
    }
}

#[test]
fn test_scalar_op_not_sparse_safe_covers_zero_rows() {
    // Arrange
    let m = sample();
    let plus = ScalarOperator::new(ScalarFn::Plus, 1.0);
    let expected = m.scalar_operation(&plus);

    for group in all_encodings(&m, &[0, 1, 2]) {
        // Act
        let shifted = group.scalar_op(&plus);

        // Assert
        for r in 0..6 {
            for c in 0..3 {
                assert_eq!(shifted.get(r, c), expected.get(r, c), "{} ({r},{c})", group.kind());
            }
        }
    }
}

#[test]
fn test_scalar_op_sparse_safe_keeps_row_structure() {
    let m = sample();
    let times = ScalarOperator::new(ScalarFn::Multiply, 3.0);
    let groups = all_encodings(&m, &[0]);
    let ole = groups[2].scalar_op(&times);
    assert_eq!(ole.num_values(), groups[2].num_values());
    assert_eq!(ole.get(3, 0), 6.0);
    assert_eq!(ole.get(2, 0), 0.0);
}

#[test]
fn test_offset_list_spans_several_blocks() {
    // Arrange
    let rows = 2 * BITMAP_BLOCK_SZ + 5;
    let mut m = MatrixBlock::sparse(rows, 1);
    m.set(0, 0, 1.0);
    m.set(BITMAP_BLOCK_SZ + 1, 0, 1.0);
    m.set(2 * BITMAP_BLOCK_SZ + 4, 0, 7.0);
    let bitmap = ColumnBitmap::extract(&ColumnSource::row_major(&m), &[0], None);
    let group = ColumnGroup::OffsetList(OleGroup::from_bitmap(vec![0], rows, bitmap));

    // Act
    let mut out = vec![0.0; 4];
    group.right_mult(&[2.0], &mut out, BITMAP_BLOCK_SZ - 1, BITMAP_BLOCK_SZ + 3);

    // Assert
    assert_eq!(out, vec![0.0, 0.0, 2.0, 0.0]);
    assert_eq!(group.get(2 * BITMAP_BLOCK_SZ + 4, 0), 7.0);
    assert_eq!(group.nnz(), 3);
    assert_eq!(num_blocks(rows), 3);
    assert_eq!(roundtrip(&group), group);
}

#[test]
fn test_run_length_splits_long_gaps_and_runs() {
    // Arrange
    let rows = 140_000;
    let mut m = MatrixBlock::sparse(rows, 1);
    m.set(3, 0, 4.0);
    for r in 69_999..139_999 {
        m.set(r, 0, 4.0);
    }
    let bitmap = ColumnBitmap::extract(&ColumnSource::row_major(&m), &[0], None);
    let group = RleGroup::from_bitmap(vec![0], rows, bitmap.clone());

    // Act
    let decoded = group.to_bitmap();

    // Assert
    assert_eq!(decoded, bitmap);
    assert_eq!(group.get(70_000, 0), 4.0);
    assert_eq!(group.get(139_999, 0), 0.0);
    assert_eq!(group.get(4, 0), 0.0);
    let wrapped = ColumnGroup::RunLength(group);
    assert_eq!(roundtrip(&wrapped), wrapped);
}

#[test]
fn test_empty_bitmap_group_costs_nothing() {
    let m = MatrixBlock::zeros(10, 2);
    let bitmap = ColumnBitmap::extract(&ColumnSource::row_major(&m), &[0, 1], None);
    let ole = OleGroup::from_bitmap(vec![0, 1], 10, bitmap.clone());
    let rle = RleGroup::from_bitmap(vec![0, 1], 10, bitmap);
    assert_eq!(ole.size_in_memory(), 0);
    assert_eq!(rle.size_in_memory(), 0);
    assert_eq!(ColumnGroup::OffsetList(ole).nnz(), 0);
}

#[test]
fn test_serialization_roundtrip_per_encoding() {
    let m = sample();
    for group in all_encodings(&m, &[0, 2]) {
        assert_eq!(roundtrip(&group), group, "{}", group.kind());
    }
}

#[test]
fn test_shared_dictionary_written_once() {
    // Arrange
    let dict = Dictionary::new(vec![1.0, 2.0, 0.0]);
    let a = ColumnGroup::Ddc(
        DdcGroup::from_parts(vec![0], 4, dict.clone(), Codes::Byte(vec![0, 1, 2, 0])).expect("a"),
    );
    let b = ColumnGroup::Ddc(
        DdcGroup::from_parts(vec![1], 4, dict, Codes::Byte(vec![1, 1, 0, 2])).expect("b"),
    );

    // Act
    let mut buf = Vec::new();
    let mut slot = SharedDictionarySlot::new(true);
    a.write_to(&mut buf, &mut slot).expect("write a");
    let first_len = buf.len();
    b.write_to(&mut buf, &mut slot).expect("write b");

    let mut slice = buf.as_slice();
    let mut read_slot = SharedDictionarySlot::new(true);
    let ra = ColumnGroup::read_from(&mut slice, &mut read_slot).expect("read a");
    let rb = ColumnGroup::read_from(&mut slice, &mut read_slot).expect("read b");

    // Assert
    assert_eq!(first_len, 13 + 1 + 4 + 24 + 4);
    assert_eq!(buf.len() - first_len, 13 + 1 + 4);
    assert_eq!((ra.clone(), rb.clone()), (a, b));
    let (da, db) = (ra.dictionary().expect("dict"), rb.dictionary().expect("dict"));
    assert!(da.ptr_eq(db));
}

#[test]
fn test_reuse_flag_without_shared_dictionary_is_rejected() {
    let dict = Dictionary::new(vec![1.0, 2.0]);
    let a = ColumnGroup::Ddc(DdcGroup::from_parts(vec![0], 2, dict.clone(), Codes::Byte(vec![0, 1])).expect("a"));
    let b = ColumnGroup::Ddc(DdcGroup::from_parts(vec![1], 2, dict, Codes::Byte(vec![1, 0])).expect("b"));
    let mut buf = Vec::new();
    let mut slot = SharedDictionarySlot::new(true);
    a.write_to(&mut buf, &mut slot).expect("write a");
    let split = buf.len();
    b.write_to(&mut buf, &mut slot).expect("write b");

    let err = ColumnGroup::read_from(&mut &buf[split..], &mut SharedDictionarySlot::new(true))
        .expect_err("dangling reuse");
    assert!(matches!(err, Error::Deserialization(_)));
}

#[test]
fn test_unknown_tag_is_rejected() {
    let bytes = [9u8, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 0];
    let err = ColumnGroup::read_from(&mut &bytes[..], &mut SharedDictionarySlot::new(false))
        .expect_err("unknown tag");
    assert_eq!(err.code(), "CLA-003");
    assert!(EncodingKind::from_tag(4).is_ok());
}

#[test]
fn test_truncated_group_is_rejected() {
    let m = sample();
    let group = &all_encodings(&m, &[0])[2];
    let mut buf = Vec::new();
    group
        .write_to(&mut buf, &mut SharedDictionarySlot::new(false))
        .expect("write");
    buf.truncate(buf.len() - 3);
    let err = ColumnGroup::read_from(&mut buf.as_slice(), &mut SharedDictionarySlot::new(false))
        .expect_err("truncated");
    assert!(matches!(err, Error::Deserialization(_)));
}

#[test]
fn test_shift_columns_moves_indices_only() {
    let m = sample();
    for group in all_encodings(&m, &[0, 2]) {
        let shifted = group.shift_columns(3);
        assert_eq!(shifted.columns(), &[3, 5]);
        assert_eq!(shifted.get(3, 3), 2.0);
        assert_eq!(shifted.get(3, 5), 3.0);
        assert_eq!(shifted.size_in_memory(), group.size_in_memory());
    }
}
