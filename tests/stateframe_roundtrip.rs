use proptest::prelude::*;
use sb_stateframe::core::codec::{FieldKind, TypeCode};
use sb_stateframe::core::layout::{FieldSpec, Node, ANTENNA_BLOCK, GENERIC_BLOCK, LONOISE_BLOCK};
use sb_stateframe::{parse, parse_file, Assembler, Frame, MonitorRecord, OffsetTable, RawValue, Value};

fn lonoise_record() -> MonitorRecord {
    let mut r = MonitorRecord::new();
    r.insert("NAME".into(), RawValue::from("LONoiseMod"));
    r.insert("LJTEMP".into(), RawValue::from(300));
    r.insert("POW_24V".into(), RawValue::from(24));
    r.insert("NSSTAT".into(), RawValue::from(0));
    r.insert("LOFREQ".into(), RawValue::from(("LO_3_4GHZ", 0i64)));
    r
}

fn antenna_record(name: &str, base: f64) -> MonitorRecord {
    let mut r = MonitorRecord::new();
    r.insert("NAME".into(), RawValue::from(name));
    r.insert("SERIAL".into(), RawValue::from(470010001));
    let floats = [
        "POW_24V", "POW_15V", "POW_12V", "POW_5V", "POW_N5V", "POW_S5V", "LJTEMP", "LJAIRTEMP",
        "VQPOW", "VIPOW", "HQPOW", "HIPOW", "VQTEMP", "VITEMP", "HQTEMP", "HITEMP",
    ];
    for (i, key) in floats.iter().enumerate() {
        r.insert(key.to_string(), RawValue::from(base + i as f64 + 0.5));
    }
    r.insert("VQATTEN".into(), RawValue::from(10.0));
    r.insert("VIATTEN".into(), RawValue::from(10.5));
    r.insert("HQATTEN".into(), RawValue::from(12.0));
    r.insert("HIATTEN".into(), RawValue::from(12.5));
    r.insert("VNSSEL".into(), RawValue::from(1));
    r.insert("HNSSEL".into(), RawValue::from(0));
    r
}

fn scenario() -> MonitorRecord {
    let mut d = MonitorRecord::new();
    d.insert("LONOISE".into(), RawValue::from(lonoise_record()));
    d.insert("A".into(), RawValue::from(antenna_record("AntennaA", 1.0)));
    d.insert("B".into(), RawValue::from(antenna_record("AntennaB", 40.0)));
    d
}

fn schema_table(frame: Frame, record: &MonitorRecord) -> (OffsetTable, Vec<u8>) {
    let dir = tempfile::tempdir().unwrap();
    let out = Assembler::new(frame)
        .with_schema_path(dir.path().join("schema.xml"))
        .with_archive_dir(None)
        .assemble(record, true);
    assert!(out.write_error.is_none());
    let table = parse_file(dir.path().join("schema.xml")).unwrap();
    (table, out.buffer)
}

/// Every field of `blocks` decoded under `prefix` must match what the
/// record resolves to.
fn assert_fields_match(
    table: &OffsetTable,
    buf: &[u8],
    prefix: &str,
    blocks: &[&[Node]],
    record: &MonitorRecord,
) {
    for node in blocks.iter().flat_map(|b| b.iter()) {
        let Node::Field(spec) = node else { continue };
        let path = format!("{}/{}", prefix, spec.name);
        let decoded = table.extract(buf, &path).unwrap();
        let expected = spec.resolve(record);
        match spec.kind {
            FieldKind::FixedString(_) => {
                assert_eq!(decoded.as_str(), Some(expected.as_text().unwrap_or("")), "{}", path)
            }
            FieldKind::Scalar(_) => {
                assert_eq!(decoded.as_f64(), Some(expected.as_f64().unwrap_or(0.0)), "{}", path)
            }
        }
    }
}

#[test]
fn scenario_layout_starts_with_name() {
    let out = Assembler::new(Frame::Ovro).assemble(&scenario(), false);
    let buf = &out.buffer;

    assert_eq!(buf.len(), 419);
    assert_eq!(&buf[0..4], &49u32.to_le_bytes());
    assert_eq!(&buf[4..14], b"LONoiseMod");
    assert!(buf[14..53].iter().all(|b| *b == 0));
    // serial absent for LONOISE
    assert_eq!(&buf[53..57], &[0, 0, 0, 0]);
    // Voltage.24v
    assert_eq!(&buf[57..61], &24.0f32.to_le_bytes());
    assert!(out.format.starts_with("<I49sIffffffff"));
}

#[test]
fn scenario_round_trip() {
    let d = scenario();
    let (table, buf) = schema_table(Frame::Ovro, &d);
    assert_eq!(table.size(), buf.len());

    assert_eq!(
        table.extract(&buf, "LONoiseModule/Temp.labjack").unwrap(),
        Value::F32(300.0)
    );
    assert_eq!(
        table.extract(&buf, "LONoiseModule/Name").unwrap(),
        Value::Text("LONoiseMod".into())
    );
    assert_eq!(
        table.extract(&buf, "LONoiseModule/LOFrequency").unwrap(),
        Value::U32(0)
    );

    let lo = d["LONOISE"].as_record().unwrap();
    let a = d["A"].as_record().unwrap();
    let b = d["B"].as_record().unwrap();
    assert_fields_match(&table, &buf, "LONoiseModule", &[GENERIC_BLOCK, LONOISE_BLOCK], lo);
    assert_fields_match(&table, &buf, "AntennaAModule", &[GENERIC_BLOCK, ANTENNA_BLOCK], a);
    assert_fields_match(&table, &buf, "AntennaBModule", &[GENERIC_BLOCK, ANTENNA_BLOCK], b);
}

#[test]
fn antenna_layout_has_no_lo_frequency() {
    let (table, _) = schema_table(Frame::Ovro, &scenario());
    assert!(table.get("LONoiseModule/LOFrequency").is_ok());
    assert!(table.get("AntennaAModule/LOFrequency").is_err());
    assert!(table.get("AntennaAModule/Attenuation.hi").is_ok());
    assert_eq!(table.len(), 12 + 24 + 24);
}

#[test]
fn assemble_is_deterministic() {
    let d = scenario();
    let asm = Assembler::new(Frame::Starburst).with_archive_dir(None);
    let dir = tempfile::tempdir().unwrap();
    let asm = asm.with_schema_path(dir.path().join("sf.xml"));

    let first = asm.assemble(&d, true);
    let second = asm.assemble(&d, true);
    assert_eq!(first.buffer, second.buffer);
    assert_eq!(first.format, second.format);
    assert_eq!(first.schema, second.schema);
}

#[test]
fn empty_input_full_frames_with_defaults() {
    let (table, buf) = schema_table(Frame::Ovro, &MonitorRecord::new());
    assert_eq!(buf.len(), 419);
    assert_eq!(
        table.extract(&buf, "AntennaBModule/Attenuation.vq").unwrap(),
        Value::F64(31.5)
    );
    assert_eq!(table.extract(&buf, "AntennaBModule/Name").unwrap(), Value::Text(String::new()));

    let (table, buf) = schema_table(Frame::Starburst, &MonitorRecord::new());
    assert_eq!(buf.len(), 1103);
    assert_eq!(table.version(), 3.0);
    assert_eq!(table.extract(&buf, "Version").unwrap(), Value::F64(3.0));
    assert_eq!(table.extract(&buf, "Starburst/Version").unwrap(), Value::U32(1));
    assert_eq!(
        table.extract(&buf, "Starburst/DCMA/Attenuation.hq").unwrap(),
        Value::F64(31.5)
    );
    assert_eq!(table.extract(&buf, "UVW").unwrap().shape(), vec![16, 3]);
    assert_eq!(table.extract(&buf, "Delay").unwrap().shape(), vec![2, 16]);
}

#[test]
fn garbage_values_fall_back() {
    let mut a = MonitorRecord::new();
    a.insert("VQPOW".into(), RawValue::from("n/a"));
    a.insert("HIATTEN".into(), RawValue::from(99.0));
    a.insert("SERIAL".into(), RawValue::from(-5));
    let mut d = MonitorRecord::new();
    d.insert("A".into(), RawValue::from(a));

    let (table, buf) = schema_table(Frame::Ovro, &d);
    assert_eq!(table.extract(&buf, "AntennaAModule/Power.vq").unwrap(), Value::F32(0.0));
    assert_eq!(
        table.extract(&buf, "AntennaAModule/Attenuation.hi").unwrap(),
        Value::F64(31.5)
    );
    assert_eq!(table.extract(&buf, "AntennaAModule/SerialNumber").unwrap(), Value::U32(0));
}

#[test]
fn starburst_units_and_header() {
    let mut d = MonitorRecord::new();
    d.insert("timestamp".into(), RawValue::from(3.7e9));
    d.insert("scan_state".into(), RawValue::from(-1));
    d.insert("phase_tracking".into(), RawValue::from(1));
    d.insert("starburst".into(), RawValue::from(scenario()));

    let (table, buf) = schema_table(Frame::Starburst, &d);
    assert_eq!(table.extract(&buf, "Timestamp").unwrap(), Value::F64(3.7e9));
    assert_eq!(table.extract(&buf, "ScanState").unwrap(), Value::I32(-1));
    assert_eq!(table.extract(&buf, "PhaseTracking").unwrap(), Value::U32(1));
    assert_eq!(
        table.extract(&buf, "Starburst/LONM/Name").unwrap(),
        Value::Text("LONoiseMod".into())
    );

    let a = scenario()["A"].as_record().unwrap().clone();
    assert_fields_match(&table, &buf, "Starburst/DCMA", &[GENERIC_BLOCK, ANTENNA_BLOCK], &a);
}

#[test]
fn cluster_array_schema_matches_bytes() {
    static REC: Node = Node::Cluster {
        name: "Rec",
        key: None,
        groups: &[&[
            Node::Field(FieldSpec::text("name", "Name", 8)),
            Node::Field(FieldSpec::scalar("id", "Id", TypeCode::U32)),
            Node::Field(FieldSpec::scalar("t", "Temp", TypeCode::Sgl)),
        ]],
    };
    static ROOT: Node = Node::Cluster {
        name: "Root",
        key: None,
        groups: &[&[Node::ClusterArray {
            name: "Recs",
            key: "recs",
            dims: &[3],
            element: &REC,
        }]],
    };

    let mut d = MonitorRecord::new();
    d.insert(
        "recs".into(),
        RawValue::List(vec![
            RawValue::record([("name", RawValue::from("abc")), ("id", RawValue::from(7))]),
            RawValue::record([("name", RawValue::from("xyz")), ("t", RawValue::from(2.5))]),
        ]),
    );

    let frag = ROOT.encode(&d, true);
    let xml = frag.schema.as_ref().map(|s| s.to_xml()).unwrap_or_default();
    let table = parse(&xml).unwrap();
    assert_eq!(table.size(), frag.bytes.len());
    assert_eq!(frag.bytes.len(), ROOT.size());

    let buf = &frag.bytes;
    assert_eq!(table.extract(buf, "Recs[0]/Name").unwrap(), Value::Text("abc".into()));
    assert_eq!(table.extract(buf, "Recs[0]/Id").unwrap(), Value::U32(7));
    assert_eq!(table.extract(buf, "Recs[1]/Name").unwrap(), Value::Text("xyz".into()));
    assert_eq!(table.extract(buf, "Recs[1]/Temp").unwrap(), Value::F32(2.5));
    // third record missing from the input
    assert_eq!(table.extract(buf, "Recs[2]/Name").unwrap(), Value::Text(String::new()));
    assert_eq!(table.extract(buf, "Recs[2]/Id").unwrap(), Value::U32(0));
    assert!(table.get("Recs[3]/Id").is_err());
}

fn geometry_table() -> OffsetTable {
    let dir = tempfile::tempdir().unwrap();
    let out = Assembler::new(Frame::Starburst)
        .with_schema_path(dir.path().join("geometry.xml"))
        .with_archive_dir(None)
        .assemble(&MonitorRecord::new(), true);
    parse(&out.schema.unwrap_or_default()).unwrap()
}

proptest! {
    #[test]
    fn uvw_and_delay_index_mapping(
        uvw in prop::collection::vec(prop::collection::vec(-1.0e6f64..1.0e6, 3), 16),
        delay in prop::collection::vec(-1.0e-3f64..1.0e-3, 16),
        delay1 in prop::collection::vec(-1.0e-3f64..1.0e-3, 16),
    ) {
        let mut d = MonitorRecord::new();
        d.insert("uvw".into(), RawValue::from(uvw.clone()));
        d.insert("delay".into(), RawValue::from(delay.clone()));
        d.insert("delay1".into(), RawValue::from(delay1.clone()));

        let table = geometry_table();
        let out = Assembler::new(Frame::Starburst).assemble(&d, false);

        let decoded_uvw = table.extract(&out.buffer, "UVW").unwrap();
        let decoded_delay = table.extract(&out.buffer, "Delay").unwrap();

        for ant in 0..16 {
            for k in 0..3 {
                prop_assert_eq!(decoded_uvw.index(&[ant, k]), Some(&Value::F64(uvw[ant][k])));
            }
            prop_assert_eq!(decoded_delay.index(&[0, ant]), Some(&Value::F64(delay[ant])));
            prop_assert_eq!(decoded_delay.index(&[1, ant]), Some(&Value::F64(delay1[ant])));
        }

        // flat order: antenna-major, u/v/w minor
        let offset = table.get("UVW").unwrap().offset;
        let second = f64::from_le_bytes(out.buffer[offset + 8..offset + 16].try_into().unwrap());
        prop_assert_eq!(second, uvw[0][1]);
    }
}
