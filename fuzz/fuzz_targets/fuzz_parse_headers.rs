#![no_main]
use libfuzzer_sys::fuzz_target;
use jpa_stream::parsing::jps::JpsDataBlockHeader;
use jpa_stream::parsing::{
    CentralDirectoryParser, EndOfCentralDirectoryParser, JpaArchiveHeaderParser,
    JpaEntityHeaderParser, JpsArchiveHeaderParser, JpsEndOfArchiveParser, JpsEntityHeaderParser,
    LocalFileHeaderParser, SliceReader,
};

fuzz_target!(|data: &[u8]| {
    let _ = JpaArchiveHeaderParser::parse(&mut SliceReader::new(data));
    let _ = JpaEntityHeaderParser::parse(&mut SliceReader::new(data));
    let _ = JpsArchiveHeaderParser::parse(&mut SliceReader::new(data));
    let _ = JpsEndOfArchiveParser::parse(&mut SliceReader::new(data));
    let _ = JpsEntityHeaderParser::parse(&mut SliceReader::new(data));
    let _ = JpsDataBlockHeader::parse(&mut SliceReader::new(data));
    let _ = CentralDirectoryParser::parse(&mut SliceReader::new(data));
    let _ = LocalFileHeaderParser::parse(&mut SliceReader::new(data));
    if let Some(offset) = EndOfCentralDirectoryParser::find(data) {
        let _ = EndOfCentralDirectoryParser::parse(&mut SliceReader::new(&data[offset..]));
    }
});
