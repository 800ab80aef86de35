use super::constants::{BANK_NAME_HEADER, BANK_NAME_WAVEFORMS};
use super::digitizer_header::DigitizerHeader;
use super::error::EventError;
use super::midas::BankSource;
use super::pmt_data::PmtData;

/// The digitizer content of one event: the header, and the waveforms if the event has any
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub header: DigitizerHeader,
    pub data: Option<PmtData>,
}

/// Decode the digitizer banks of an event.
///
/// Returns `Ok(None)` if the event has no DGH0 bank. An event with a header but no DIG0
/// bank decodes to a header without data.
pub fn decode_event<S: BankSource + ?Sized>(
    source: &S,
) -> Result<Option<DecodedEvent>, EventError> {
    let header_bank = match source.find_bank(BANK_NAME_HEADER) {
        Some(bank) => bank,
        None => return Ok(None),
    };
    let header = DigitizerHeader::new(&header_bank.to_u32_words()?)?;

    let data = match source.find_bank(BANK_NAME_WAVEFORMS) {
        Some(bank) => Some(PmtData::new(&header, &bank.to_u16_words()?)?),
        None => None,
    };

    Ok(Some(DecodedEvent { header, data }))
}
