use g10_obj::{
    Object, ObjectFlags, RelocKind, Relocation, Section, Symbol, SymbolBinding,
};

fn sample_object() -> Object {
    let mut obj = Object::new();

    let mut text = Section::code(".text", 0x2000);
    text.data = vec![0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
    text.size = text.data.len() as u32;
    let text_idx = obj.add_section(text) as u32;

    let mut bss = Section::bss(".bss", 0x8000_0000);
    bss.size = 64;
    obj.add_section(bss);

    let mut start = Symbol::label("start", 0x2006, text_idx);
    start.binding = SymbolBinding::Global;
    obj.add_symbol(start).unwrap();
    obj.add_symbol(Symbol::label("loop", 0x2000, text_idx)).unwrap();
    let far = obj.add_symbol(Symbol::extern_("far")).unwrap() as u32;

    obj.add_relocation(Relocation {
        offset: 2,
        symbol: far,
        section: text_idx,
        kind: RelocKind::Abs32,
        addend: 0,
    })
    .unwrap();

    obj.set_flags(ObjectFlags::RELOCATABLE | ObjectFlags::HAS_ENTRY);
    obj
}

#[test]
fn save_then_load_is_identity() {
    let obj = sample_object();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.g10o");

    obj.save(&path).unwrap();
    let loaded = Object::load(&path).unwrap();

    assert_eq!(loaded, obj);
}

#[test]
fn loaded_objects_validate() {
    let obj = sample_object();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.g10o");
    obj.save(&path).unwrap();

    let loaded = Object::load(&path).unwrap();
    loaded.validate().unwrap();
}

#[test]
fn in_memory_round_trip() {
    let obj = sample_object();
    let bytes = obj.to_bytes().unwrap();
    let decoded = Object::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, obj);
}

#[test]
fn empty_object_round_trips() {
    let obj = Object::new();
    let bytes = obj.to_bytes().unwrap();
    assert_eq!(bytes.len(), g10_obj::HEADER_SIZE + 1); // header + NUL string table
    let decoded = Object::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, obj);
}

#[test]
fn bss_bytes_are_not_persisted() {
    let obj = sample_object();
    let bytes = obj.to_bytes().unwrap();

    // Header + 2 section headers + 8 bytes of .text data; the 64-byte BSS
    // reservation contributes nothing to the image.
    let with_bss_inline = g10_obj::HEADER_SIZE
        + 2 * g10_obj::SECTION_HEADER_SIZE
        + 8
        + 64;
    assert!(bytes.len() < with_bss_inline + 3 * g10_obj::SYMBOL_ENTRY_SIZE);

    let decoded = Object::from_bytes(&bytes).unwrap();
    let bss = &decoded.sections()[1];
    assert_eq!(bss.size, 64);
    assert!(bss.data.is_empty());
}

#[test]
fn save_refuses_invalid_objects() {
    let mut obj = sample_object();
    // Corrupt the recorded size of the loaded section.
    obj.section_mut(0).unwrap().size = 4;
    assert!(obj.to_bytes().is_err());
}
