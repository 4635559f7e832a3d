use slotbuf_common::{Result, error::ErrorKind};

use crate::{
    builder::{Builder, BuilderOptions},
    follow::Follow,
    offset::WIPOffset,
    root::{root, root_at},
    verifier::VerifierOptions,
};

use self::fbs::{
    PARAMETER_OPTIMIZER_STATE_IDENTIFIER, ParameterOptimizerState, ParameterOptimizerStateArgs, Tensor, TensorArgs,
    finish_parameter_optimizer_state_buffer, parameter_optimizer_state_buffer_has_identifier,
    root_as_parameter_optimizer_state, root_as_parameter_optimizer_state_verified,
};

/// Accessors for two tables of an optimizer checkpoint schema, written the way
/// a schema compiler emits them.
mod fbs {
    use slotbuf_common::Result;

    use crate::{
        builder::Builder,
        follow::{Follow, Indirect},
        offset::WIPOffset,
        primitives::FieldIndex,
        root::{buffer_has_identifier, root, root_verified},
        table::Table,
        vector::Vector,
        verifier::{Verifiable, Verifier, VerifierOptions},
    };

    pub enum TensorOffset {}

    #[derive(Clone, Copy, Debug)]
    pub struct Tensor<'a> {
        table: Table<'a>,
    }

    impl<'a> Follow<'a> for Tensor<'a> {
        type Inner = Tensor<'a>;

        fn follow(buf: &'a [u8], pos: usize) -> Result<Tensor<'a>> {
            Ok(Tensor {
                table: Table::new(buf, pos),
            })
        }
    }

    impl<'a> Tensor<'a> {
        pub const VT_NAME: FieldIndex = 0;
        pub const VT_DOC_STRING: FieldIndex = 1;
        pub const VT_DIMS: FieldIndex = 2;
        pub const VT_DATA_TYPE: FieldIndex = 3;
        pub const VT_RAW_DATA: FieldIndex = 4;
        pub const VT_STRING_DATA: FieldIndex = 5;
        pub const VT_EXTERNAL_DATA_OFFSET: FieldIndex = 6;

        pub fn create(b: &mut Builder, args: &TensorArgs) -> Result<WIPOffset<TensorOffset>> {
            let mut t = TensorBuilder::new(b)?;
            t.add_external_data_offset(args.external_data_offset)?;
            if let Some(x) = args.string_data {
                t.add_string_data(x)?;
            }
            if let Some(x) = args.raw_data {
                t.add_raw_data(x)?;
            }
            t.add_data_type(args.data_type)?;
            if let Some(x) = args.dims {
                t.add_dims(x)?;
            }
            if let Some(x) = args.doc_string {
                t.add_doc_string(x)?;
            }
            if let Some(x) = args.name {
                t.add_name(x)?;
            }
            t.finish()
        }

        pub fn table(&self) -> Table<'a> {
            self.table
        }

        pub fn name(&self) -> Result<Option<&'a str>> {
            self.table.get_str(Self::VT_NAME)
        }

        pub fn doc_string(&self) -> Result<Option<&'a str>> {
            self.table.get_str(Self::VT_DOC_STRING)
        }

        pub fn dims(&self) -> Result<Option<Vector<'a, i64>>> {
            self.table.get_vector::<i64>(Self::VT_DIMS)
        }

        pub fn data_type(&self) -> Result<i32> {
            self.table.get::<i32>(Self::VT_DATA_TYPE, 0)
        }

        pub fn raw_data(&self) -> Result<Option<&'a [u8]>> {
            self.table.get_bytes(Self::VT_RAW_DATA)
        }

        pub fn string_data(&self) -> Result<Option<Vector<'a, Indirect<&'a str>>>> {
            self.table.get_vector::<Indirect<&'a str>>(Self::VT_STRING_DATA)
        }

        pub fn string_data_len(&self) -> Result<usize> {
            self.table.vector_len(Self::VT_STRING_DATA)
        }

        pub fn external_data_offset(&self) -> Result<i64> {
            self.table.get::<i64>(Self::VT_EXTERNAL_DATA_OFFSET, -1)
        }
    }

    impl Verifiable for Tensor<'_> {
        fn run_verifier(v: &mut Verifier<'_, '_>, pos: usize) -> Result<()> {
            v.visit_table(pos)?
                .visit_indirect::<&str>("name", Tensor::VT_NAME, false)?
                .visit_indirect::<&str>("doc_string", Tensor::VT_DOC_STRING, false)?
                .visit_indirect::<Vector<i64>>("dims", Tensor::VT_DIMS, false)?
                .visit_field::<i32>("data_type", Tensor::VT_DATA_TYPE, false)?
                .visit_indirect::<Vector<u8>>("raw_data", Tensor::VT_RAW_DATA, false)?
                .visit_indirect::<Vector<Indirect<&str>>>("string_data", Tensor::VT_STRING_DATA, false)?
                .visit_field::<i64>("external_data_offset", Tensor::VT_EXTERNAL_DATA_OFFSET, false)?
                .finish()
        }
    }

    pub struct TensorArgs {
        pub name: Option<WIPOffset<str>>,
        pub doc_string: Option<WIPOffset<str>>,
        pub dims: Option<WIPOffset<[i64]>>,
        pub data_type: i32,
        pub raw_data: Option<WIPOffset<[u8]>>,
        pub string_data: Option<WIPOffset<[WIPOffset<str>]>>,
        pub external_data_offset: i64,
    }

    impl Default for TensorArgs {
        fn default() -> Self {
            TensorArgs {
                name: None,
                doc_string: None,
                dims: None,
                data_type: 0,
                raw_data: None,
                string_data: None,
                external_data_offset: -1,
            }
        }
    }

    pub struct TensorBuilder<'b> {
        b: &'b mut Builder,
    }

    impl<'b> TensorBuilder<'b> {
        pub fn new(b: &'b mut Builder) -> Result<TensorBuilder<'b>> {
            b.start_object(7)?;
            Ok(TensorBuilder { b })
        }

        pub fn add_name(&mut self, name: WIPOffset<str>) -> Result<()> {
            self.b.push_slot_offset(Tensor::VT_NAME, name)
        }

        pub fn add_doc_string(&mut self, doc_string: WIPOffset<str>) -> Result<()> {
            self.b.push_slot_offset(Tensor::VT_DOC_STRING, doc_string)
        }

        pub fn add_dims(&mut self, dims: WIPOffset<[i64]>) -> Result<()> {
            self.b.push_slot_offset(Tensor::VT_DIMS, dims)
        }

        pub fn add_data_type(&mut self, data_type: i32) -> Result<()> {
            self.b.push_slot::<i32>(Tensor::VT_DATA_TYPE, data_type, 0)
        }

        pub fn add_raw_data(&mut self, raw_data: WIPOffset<[u8]>) -> Result<()> {
            self.b.push_slot_offset(Tensor::VT_RAW_DATA, raw_data)
        }

        pub fn add_string_data(&mut self, string_data: WIPOffset<[WIPOffset<str>]>) -> Result<()> {
            self.b.push_slot_offset(Tensor::VT_STRING_DATA, string_data)
        }

        pub fn add_external_data_offset(&mut self, offset: i64) -> Result<()> {
            self.b.push_slot::<i64>(Tensor::VT_EXTERNAL_DATA_OFFSET, offset, -1)
        }

        pub fn finish(self) -> Result<WIPOffset<TensorOffset>> {
            let t = self.b.end_object()?;
            self.b.required(t, Tensor::VT_NAME, "name")?;
            Ok(t.cast())
        }
    }

    pub const PARAMETER_OPTIMIZER_STATE_IDENTIFIER: &str = "ODTC";

    pub enum ParameterOptimizerStateOffset {}

    #[derive(Clone, Copy, Debug)]
    pub struct ParameterOptimizerState<'a> {
        table: Table<'a>,
    }

    impl<'a> Follow<'a> for ParameterOptimizerState<'a> {
        type Inner = ParameterOptimizerState<'a>;

        fn follow(buf: &'a [u8], pos: usize) -> Result<ParameterOptimizerState<'a>> {
            Ok(ParameterOptimizerState {
                table: Table::new(buf, pos),
            })
        }
    }

    impl<'a> ParameterOptimizerState<'a> {
        pub const VT_PARAM_NAME: FieldIndex = 0;
        pub const VT_MOMENTUMS: FieldIndex = 1;

        pub fn create(
            b: &mut Builder,
            args: &ParameterOptimizerStateArgs,
        ) -> Result<WIPOffset<ParameterOptimizerStateOffset>> {
            b.start_object(2)?;
            if let Some(x) = args.momentums {
                b.push_slot_offset(Self::VT_MOMENTUMS, x)?;
            }
            if let Some(x) = args.param_name {
                b.push_slot_offset(Self::VT_PARAM_NAME, x)?;
            }
            Ok(b.end_object()?.cast())
        }

        pub fn param_name(&self) -> Result<Option<&'a str>> {
            self.table.get_str(Self::VT_PARAM_NAME)
        }

        pub fn momentums(&self) -> Result<Option<Vector<'a, Indirect<Tensor<'a>>>>> {
            self.table.get_vector::<Indirect<Tensor<'a>>>(Self::VT_MOMENTUMS)
        }

        pub fn momentums_len(&self) -> Result<usize> {
            self.table.vector_len(Self::VT_MOMENTUMS)
        }

        pub fn momentums_is_none(&self) -> Result<bool> {
            self.table.is_absent(Self::VT_MOMENTUMS)
        }

        /// Opens the momentums vector for elements pushed one by one, last first.
        pub fn start_momentums_vector(b: &mut Builder, num_elems: usize) -> Result<()> {
            b.start_vector(4, num_elems, 4)
        }
    }

    impl Verifiable for ParameterOptimizerState<'_> {
        fn run_verifier(v: &mut Verifier<'_, '_>, pos: usize) -> Result<()> {
            v.visit_table(pos)?
                .visit_indirect::<&str>("param_name", ParameterOptimizerState::VT_PARAM_NAME, false)?
                .visit_indirect::<Vector<Indirect<Tensor>>>(
                    "momentums",
                    ParameterOptimizerState::VT_MOMENTUMS,
                    false,
                )?
                .finish()
        }
    }

    #[derive(Default)]
    pub struct ParameterOptimizerStateArgs {
        pub param_name: Option<WIPOffset<str>>,
        pub momentums: Option<WIPOffset<[WIPOffset<TensorOffset>]>>,
    }

    pub fn root_as_parameter_optimizer_state(buf: &[u8]) -> Result<ParameterOptimizerState<'_>> {
        root::<ParameterOptimizerState>(buf)
    }

    pub fn root_as_parameter_optimizer_state_verified<'a>(
        buf: &'a [u8],
        options: &VerifierOptions,
    ) -> Result<ParameterOptimizerState<'a>> {
        root_verified::<ParameterOptimizerState>(buf, options)
    }

    pub fn parameter_optimizer_state_buffer_has_identifier(
        buf: &[u8],
        offset: usize,
        size_prefixed: bool,
    ) -> bool {
        buffer_has_identifier(
            buf,
            offset,
            PARAMETER_OPTIMIZER_STATE_IDENTIFIER.as_bytes(),
            size_prefixed,
        )
    }

    pub fn finish_parameter_optimizer_state_buffer(
        b: &mut Builder,
        root: WIPOffset<ParameterOptimizerStateOffset>,
    ) -> Result<()> {
        b.finish(root, Some(PARAMETER_OPTIMIZER_STATE_IDENTIFIER))
    }
}

fn build_checkpoint(b: &mut Builder, num_momentums: usize) -> Vec<u8> {
    let mut momentums = Vec::new();
    for i in 0..num_momentums {
        let name = b.create_string(&format!("momentum_{i}")).unwrap();
        let doc = b.create_string("first moment estimate").unwrap();
        let dims = b.create_vector(&[2i64, i as i64 + 1]).unwrap();
        let raw = b.create_byte_vector(&vec![i as u8; 8 * (i + 1)]).unwrap();
        let labels = b.create_vector_of_strings(&["x", "y"]).unwrap();
        momentums.push(
            Tensor::create(
                b,
                &TensorArgs {
                    name: Some(name),
                    doc_string: Some(doc),
                    dims: Some(dims),
                    data_type: 1,
                    raw_data: Some(raw),
                    string_data: Some(labels),
                    external_data_offset: if i % 2 == 0 { -1 } else { 4096 * i as i64 },
                },
            )
            .unwrap(),
        );
    }
    let momentums = b.create_vector_of_offsets(&momentums).unwrap();
    let param_name = b.create_string("fc1.weight").unwrap();
    let state = ParameterOptimizerState::create(
        b,
        &ParameterOptimizerStateArgs {
            param_name: Some(param_name),
            momentums: Some(momentums),
        },
    )
    .unwrap();
    finish_parameter_optimizer_state_buffer(b, state).unwrap();
    b.finished_data().unwrap().to_vec()
}

/// Reads every field reachable from the root, failing on the first error.
fn read_all(buf: &[u8]) -> Result<usize> {
    let state = root_as_parameter_optimizer_state(buf)?;
    let mut touched = state.param_name()?.map_or(0, str::len);
    touched += state.momentums_len()?;
    if let Some(momentums) = state.momentums()? {
        for tensor in momentums.iter() {
            let tensor = tensor?;
            touched += tensor.name()?.map_or(0, str::len);
            touched += tensor.doc_string()?.map_or(0, str::len);
            if let Some(dims) = tensor.dims()? {
                touched += dims.to_vec()?.len();
            }
            tensor.data_type()?;
            touched += tensor.raw_data()?.map_or(0, <[u8]>::len);
            if let Some(labels) = tensor.string_data()? {
                touched += labels.to_vec()?.len();
            }
            tensor.external_data_offset()?;
            touched += 1;
        }
    }
    Ok(touched)
}

#[test]
fn test_checkpoint_round_trip() {
    let mut b = Builder::new();
    let buf = build_checkpoint(&mut b, 3);
    assert!(parameter_optimizer_state_buffer_has_identifier(&buf, 0, false));

    let state = root_as_parameter_optimizer_state(&buf).unwrap();
    assert_eq!(state.param_name().unwrap(), Some("fc1.weight"));
    assert_eq!(state.momentums_len().unwrap(), 3);
    let momentums = state.momentums().unwrap().unwrap();
    for (i, tensor) in momentums.iter().enumerate() {
        let tensor = tensor.unwrap();
        assert_eq!(tensor.name().unwrap(), Some(format!("momentum_{i}").as_str()));
        assert_eq!(tensor.doc_string().unwrap(), Some("first moment estimate"));
        assert_eq!(
            tensor.dims().unwrap().unwrap().to_vec().unwrap(),
            vec![2, i as i64 + 1]
        );
        assert_eq!(tensor.data_type().unwrap(), 1);
        assert_eq!(tensor.raw_data().unwrap().unwrap(), vec![i as u8; 8 * (i + 1)].as_slice());
        assert_eq!(tensor.string_data_len().unwrap(), 2);
        let labels = tensor.string_data().unwrap().unwrap();
        assert_eq!(labels.get(1).unwrap(), "y");
        let expected_offset = if i % 2 == 0 { -1 } else { 4096 * i as i64 };
        assert_eq!(tensor.external_data_offset().unwrap(), expected_offset);
        // the default offset was elided
        assert_eq!(
            tensor
                .table()
                .is_absent(Tensor::VT_EXTERNAL_DATA_OFFSET)
                .unwrap(),
            i % 2 == 0
        );
    }
    assert!(read_all(&buf).is_ok());
}

#[test]
fn test_empty_vector_versus_absent_vector() {
    let mut b = Builder::new();
    let name = b.create_string("alpha").unwrap();
    let momentums = b.create_vector_of_offsets::<fbs::TensorOffset>(&[]).unwrap();
    let state = ParameterOptimizerState::create(
        &mut b,
        &ParameterOptimizerStateArgs {
            param_name: Some(name),
            momentums: Some(momentums),
        },
    )
    .unwrap();
    finish_parameter_optimizer_state_buffer(&mut b, state).unwrap();
    let buf = b.finished_data().unwrap();
    let state = root_as_parameter_optimizer_state(buf).unwrap();
    assert_eq!(state.param_name().unwrap(), Some("alpha"));
    assert_eq!(state.momentums_len().unwrap(), 0);
    assert!(!state.momentums_is_none().unwrap());
    assert!(state.momentums().unwrap().unwrap().is_empty());

    b.reset();
    let name = b.create_string("alpha").unwrap();
    let state = ParameterOptimizerState::create(
        &mut b,
        &ParameterOptimizerStateArgs {
            param_name: Some(name),
            momentums: None,
        },
    )
    .unwrap();
    finish_parameter_optimizer_state_buffer(&mut b, state).unwrap();
    let buf = b.finished_data().unwrap();
    let state = root_as_parameter_optimizer_state(buf).unwrap();
    assert_eq!(state.param_name().unwrap(), Some("alpha"));
    assert_eq!(state.momentums_len().unwrap(), 0);
    assert!(state.momentums_is_none().unwrap());
    assert!(state.momentums().unwrap().is_none());
}

#[test]
fn test_structurally_identical_tables_share_vtable() {
    let mut b = Builder::new();
    let buf = build_checkpoint(&mut b, 4);
    // even and odd tensors differ in whether external_data_offset is present,
    // the state table adds a third shape
    assert_eq!(b.num_vtables(), 3);

    let state = root_as_parameter_optimizer_state(&buf).unwrap();
    let tensors = state.momentums().unwrap().unwrap().to_vec().unwrap();
    let vtable = |i: usize| tensors[i].table().vtable().unwrap().position();
    assert_eq!(vtable(0), vtable(2));
    assert_eq!(vtable(1), vtable(3));
    assert_ne!(vtable(0), vtable(1));
    assert_eq!(tensors[2].external_data_offset().unwrap(), -1);
    assert_eq!(tensors[3].external_data_offset().unwrap(), 4096 * 3);
}

#[test]
fn test_required_field_enforced_on_build() {
    let mut b = Builder::new();
    let err = Tensor::create(&mut b, &TensorArgs::default()).unwrap_err();
    match err.kind() {
        ErrorKind::InvalidFormat { element, .. } => assert_eq!(element, "name"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_relocated_buffer_reads_identically() {
    let mut b = Builder::new();
    let buf = build_checkpoint(&mut b, 2);
    let expected = read_all(&buf).unwrap();
    for shift in 1..=16 {
        let mut outer = vec![0xa5u8; shift];
        outer.extend_from_slice(&buf);
        let state = root_at::<ParameterOptimizerState>(&outer, shift).unwrap();
        assert_eq!(state.param_name().unwrap(), Some("fc1.weight"));
        let tensor = state.momentums().unwrap().unwrap().get(1).unwrap();
        assert_eq!(tensor.name().unwrap(), Some("momentum_1"));
        assert_eq!(read_all(&outer[shift..]).unwrap(), expected);
        assert!(parameter_optimizer_state_buffer_has_identifier(&outer, shift, false));
    }
}

#[test]
fn test_identifier_check() {
    let mut b = Builder::new();
    let buf = build_checkpoint(&mut b, 1);
    assert!(parameter_optimizer_state_buffer_has_identifier(&buf, 0, false));
    for len in 0..8 {
        assert!(!parameter_optimizer_state_buffer_has_identifier(&buf[..len], 0, false));
    }
    let mut other = buf.clone();
    other[7] = b'X';
    assert!(!parameter_optimizer_state_buffer_has_identifier(&other, 0, false));
    // the identifier is not part of the data the root points at
    assert_eq!(read_all(&other).unwrap(), read_all(&buf).unwrap());

    let mut b = Builder::new();
    b.start_object(2).unwrap();
    let t = b.end_object().unwrap();
    b.finish_minimal(t).unwrap();
    assert!(!parameter_optimizer_state_buffer_has_identifier(
        b.finished_data().unwrap(),
        0,
        false
    ));
}

#[test]
fn test_verified_root() {
    let mut b = Builder::new();
    let buf = build_checkpoint(&mut b, 3);
    let options = VerifierOptions::default();
    let state = root_as_parameter_optimizer_state_verified(&buf, &options).unwrap();
    assert_eq!(state.momentums_len().unwrap(), 3);

    let strict = VerifierOptions {
        max_tables: 3,
        ..Default::default()
    };
    let err = root_as_parameter_optimizer_state_verified(&buf, &strict).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::CapacityExceeded { .. }));
}

#[test]
fn test_truncated_buffers_never_panic() {
    let mut b = Builder::new();
    let buf = build_checkpoint(&mut b, 2);
    let options = VerifierOptions::default();
    for len in 0..buf.len() {
        let truncated = &buf[..len];
        let _ = read_all(truncated);
        let verified = root_as_parameter_optimizer_state_verified(truncated, &options);
        if verified.is_ok() {
            assert!(read_all(truncated).is_ok());
        }
    }
    // cutting into the root table always fails
    assert!(read_all(&buf[..16]).is_err());
}

#[test]
fn test_corrupted_buffers_never_panic() {
    let mut b = Builder::new();
    let buf = build_checkpoint(&mut b, 3);
    let options = VerifierOptions::default();
    let mut rng = fastrand::Rng::with_seed(0x51_07_b0f);
    let mut rejected = 0;
    for _ in 0..2000 {
        let mut corrupted = buf.clone();
        for _ in 0..rng.usize(1..4) {
            let pos = rng.usize(..corrupted.len());
            corrupted[pos] = rng.u8(..);
        }
        let read = read_all(&corrupted);
        match root_as_parameter_optimizer_state_verified(&corrupted, &options) {
            // whatever the verifier accepts can be read completely
            Ok(_) => assert!(read.is_ok(), "verified buffer failed to read: {read:?}"),
            Err(e) => {
                assert!(
                    e.is_malformed_input()
                        || matches!(e.kind(), ErrorKind::CapacityExceeded { .. })
                );
                rejected += 1;
            }
        }
    }
    assert!(rejected > 0);
}

#[test]
fn test_concurrent_readers() {
    let mut b = Builder::new();
    build_checkpoint(&mut b, 4);
    let owned = b.into_owned_root().unwrap();
    assert!(owned.has_identifier(b"ODTC"));
    owned
        .verify::<ParameterOptimizerState>(&VerifierOptions::default())
        .unwrap();
    let expected = read_all(owned.bytes()).unwrap();

    std::thread::scope(|s| {
        for _ in 0..4 {
            let owned = owned.clone();
            s.spawn(move || {
                for _ in 0..50 {
                    assert_eq!(read_all(owned.bytes()).unwrap(), expected);
                    let state = owned.get::<ParameterOptimizerState>().unwrap();
                    assert_eq!(state.momentums_len().unwrap(), 4);
                }
            });
        }
        for _ in 0..4 {
            s.spawn(|| {
                let state = owned.get::<ParameterOptimizerState>().unwrap();
                assert_eq!(state.param_name().unwrap(), Some("fc1.weight"));
            });
        }
    });
}

#[test]
fn test_shared_strings_across_tables() {
    let mut b = Builder::with_options(BuilderOptions {
        dedup_strings: true,
        ..Default::default()
    });
    let a = build_checkpoint(&mut b, 4);
    let mut plain = Builder::new();
    let p = build_checkpoint(&mut plain, 4);
    // the doc string and labels are stored once
    assert!(a.len() < p.len());
    assert_eq!(read_all(&a).unwrap(), read_all(&p).unwrap());

    let state = root::<ParameterOptimizerState>(&a).unwrap();
    let tensors = state.momentums().unwrap().unwrap().to_vec().unwrap();
    let doc_pos = |i: usize| {
        let t = tensors[i].table();
        t.indirect(t.field_position(Tensor::VT_DOC_STRING).unwrap().unwrap())
            .unwrap()
    };
    assert_eq!(doc_pos(0), doc_pos(3));
}

#[test]
fn test_force_defaults_round_trip() {
    let mut b = Builder::with_options(BuilderOptions {
        force_defaults: true,
        ..Default::default()
    });
    let buf = build_checkpoint(&mut b, 2);
    let state = root_as_parameter_optimizer_state(&buf).unwrap();
    let tensor = state.momentums().unwrap().unwrap().get(0).unwrap();
    assert!(
        !tensor
            .table()
            .is_absent(Tensor::VT_EXTERNAL_DATA_OFFSET)
            .unwrap()
    );
    assert_eq!(tensor.external_data_offset().unwrap(), -1);
    assert_eq!(Tensor::follow(&buf, tensor.table().position()).unwrap().data_type().unwrap(), 1);
}

#[test]
fn test_size_prefixed_identifier_check() {
    let mut b = Builder::new();
    let name = b.create_string("fc2.bias").unwrap();
    let state = ParameterOptimizerState::create(
        &mut b,
        &ParameterOptimizerStateArgs {
            param_name: Some(name),
            momentums: None,
        },
    )
    .unwrap();
    b.finish_size_prefixed(state, Some(PARAMETER_OPTIMIZER_STATE_IDENTIFIER))
        .unwrap();
    let buf = b.finished_data().unwrap();
    assert!(parameter_optimizer_state_buffer_has_identifier(buf, 0, true));
    assert!(!parameter_optimizer_state_buffer_has_identifier(buf, 0, false));

    let mut outer = vec![0u8; 8];
    outer.extend_from_slice(buf);
    assert!(parameter_optimizer_state_buffer_has_identifier(&outer, 8, true));
    assert!(!parameter_optimizer_state_buffer_has_identifier(&outer, 4, true));
}

#[test]
fn test_momentums_vector_built_element_by_element() {
    let tensors = |b: &mut Builder| {
        (0..3)
            .map(|i| {
                let name = b.create_string(&format!("m{i}")).unwrap();
                Tensor::create(
                    b,
                    &TensorArgs {
                        name: Some(name),
                        data_type: i,
                        ..Default::default()
                    },
                )
                .unwrap()
            })
            .collect::<Vec<_>>()
    };
    let finish = |b: &mut Builder, momentums: WIPOffset<[WIPOffset<fbs::TensorOffset>]>| {
        let state = ParameterOptimizerState::create(
            b,
            &ParameterOptimizerStateArgs {
                param_name: None,
                momentums: Some(momentums),
            },
        )
        .unwrap();
        finish_parameter_optimizer_state_buffer(b, state).unwrap();
        b.finished_data().unwrap().to_vec()
    };

    let mut b = Builder::new();
    let items = tensors(&mut b);
    let momentums = b.create_vector_of_offsets(&items).unwrap();
    let expected = finish(&mut b, momentums);

    let mut b = Builder::new();
    let items = tensors(&mut b);
    ParameterOptimizerState::start_momentums_vector(&mut b, items.len()).unwrap();
    for item in items.iter().rev() {
        b.push_offset(*item).unwrap();
    }
    let momentums = b.end_vector(items.len()).unwrap();
    let buf = finish(&mut b, momentums);
    assert_eq!(buf, expected);

    let state = root_as_parameter_optimizer_state(&buf).unwrap();
    assert!(state.param_name().unwrap().is_none());
    let momentums = state.momentums().unwrap().unwrap();
    for (i, tensor) in momentums.iter().enumerate() {
        let tensor = tensor.unwrap();
        assert_eq!(tensor.name().unwrap(), Some(format!("m{i}").as_str()));
        assert_eq!(tensor.data_type().unwrap(), i as i32);
    }

    // one element short of the announced count
    let mut b = Builder::new();
    let items = tensors(&mut b);
    ParameterOptimizerState::start_momentums_vector(&mut b, items.len()).unwrap();
    for item in items.iter().skip(1).rev() {
        b.push_offset(*item).unwrap();
    }
    let err = b.end_vector::<[WIPOffset<fbs::TensorOffset>]>(items.len()).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
    assert!(b.is_poisoned());
}
