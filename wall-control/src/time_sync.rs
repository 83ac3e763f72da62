use crate::error::ProtocolError;
use crate::onvif_requests;
use crate::soap::{self, SoapTransport};
use roxmltree::{Document, Node};
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time};

const SKEW_WARNING: Duration = Duration::seconds(5);
const OPERATION: &str = "GetSystemDateAndTime";

/// Device clock minus local clock, from one unauthenticated request.
pub async fn measure_offset(
    transport: &dyn SoapTransport,
    device_endpoint: &str,
) -> Result<Duration, ProtocolError> {
    let request = onvif_requests::get_system_date_and_time();
    let response = soap::send(transport, device_endpoint, &request, None, Duration::ZERO).await?;
    let local = OffsetDateTime::now_utc();
    let device = parse_device_time(&response.body)?;
    let offset = device - local;
    if exceeds_skew_warning(offset) {
        log::warn!(
            "{} clock differs from local time by {:.1}s; applying offset to authentication",
            device_endpoint,
            offset.as_seconds_f64()
        );
    } else {
        log::debug!("{} clock offset {:.3}s", device_endpoint, offset.as_seconds_f64());
    }
    Ok(offset)
}

/// True when the offset is large enough to be reported as a warning.
pub fn exceeds_skew_warning(offset: Duration) -> bool {
    offset.abs() > SKEW_WARNING
}

pub fn parse_device_time(body: &str) -> Result<OffsetDateTime, ProtocolError> {
    let doc = Document::parse(body)
        .map_err(|err| ProtocolError::malformed(OPERATION, format!("invalid XML: {err}")))?;
    let utc = doc
        .descendants()
        .find(|node| node.has_tag_name("UTCDateTime"))
        .ok_or_else(|| ProtocolError::malformed(OPERATION, "UTCDateTime missing"))?;
    let date = child(utc, "Date")?;
    let clock = child(utc, "Time")?;

    let month = Month::try_from(component(date, "Month")?)
        .map_err(|err| ProtocolError::malformed(OPERATION, err.to_string()))?;
    let date = Date::from_calendar_date(number(date, "Year")?, month, component(date, "Day")?)
        .map_err(|err| ProtocolError::malformed(OPERATION, err.to_string()))?;
    let clock = Time::from_hms(
        component(clock, "Hour")?,
        component(clock, "Minute")?,
        component(clock, "Second")?,
    )
    .map_err(|err| ProtocolError::malformed(OPERATION, err.to_string()))?;
    Ok(PrimitiveDateTime::new(date, clock).assume_utc())
}

fn child<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &str,
) -> Result<Node<'a, 'input>, ProtocolError> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .ok_or_else(|| ProtocolError::malformed(OPERATION, format!("{tag} missing")))
}

fn number(node: Node, tag: &str) -> Result<i32, ProtocolError> {
    let text = child(node, tag)?.text().map(str::trim).unwrap_or_default();
    text.parse::<i32>()
        .map_err(|_| ProtocolError::malformed(OPERATION, format!("{tag} '{text}' is not a number")))
}

fn component(node: Node, tag: &str) -> Result<u8, ProtocolError> {
    let value = number(node, tag)?;
    u8::try_from(value)
        .map_err(|_| ProtocolError::malformed(OPERATION, format!("{tag} {value} is out of range")))
}

#[cfg(test)]
pub(crate) fn date_time_body(at: OffsetDateTime) -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:tds="http://www.onvif.org/ver10/device/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema"><s:Body><tds:GetSystemDateAndTimeResponse><tds:SystemDateAndTime><tt:DateTimeType>NTP</tt:DateTimeType><tt:DaylightSavings>false</tt:DaylightSavings><tt:UTCDateTime><tt:Time><tt:Hour>{}</tt:Hour><tt:Minute>{}</tt:Minute><tt:Second>{}</tt:Second></tt:Time><tt:Date><tt:Year>{}</tt:Year><tt:Month>{}</tt:Month><tt:Day>{}</tt:Day></tt:Date></tt:UTCDateTime></tds:SystemDateAndTime></tds:GetSystemDateAndTimeResponse></s:Body></s:Envelope>"#,
        at.hour(),
        at.minute(),
        at.second(),
        at.year(),
        u8::from(at.month()),
        at.day()
    )
}
