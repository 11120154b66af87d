//! Known protocol messages, grouped by device capability.
//!
//! Every group is declared once at startup; a schema error here is a bug in
//! the declarations, surfaced by [`Catalog::load`].

use crate::codec::{Field, FieldType, Fields};
use crate::error::Result;
use crate::multi::{Expected, Max, MultiOptions, ResponsePolicy};
use crate::protocol::{Packet, PROTOCOL_NUMBER};

use super::registry::{message, MessageType, Messages};

const STATE_ZONE: u16 = 503;
const STATE_MULTI_ZONE: u16 = 506;
const STATE_64: u16 = 711;
const ZONES_PER_MULTI_ZONE: usize = 8;

/// Hue, saturation, brightness and kelvin of one colour.
pub fn hsbk() -> Result<Fields> {
    Fields::new([
        Field::new("hue", FieldType::uint16()),
        Field::new("saturation", FieldType::uint16()),
        Field::new("brightness", FieldType::uint16()),
        Field::new("kelvin", FieldType::uint16()).with_default(3500u16),
    ])
}

/// Reply counting for `GetColorZones`.
///
/// The zone count only arrives with the replies, so the expected total is
/// unknown until the first one is seen. Devices answer with one
/// `StateZone` per zone or one `StateMultiZone` per eight zones.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorZonesPolicy;

impl ResponsePolicy for ColorZonesPolicy {
    fn determine_res_packet(&self, _request: &Packet, kind: &MessageType) -> bool {
        kind.protocol() == PROTOCOL_NUMBER
            && matches!(kind.pkt_type(), STATE_ZONE | STATE_MULTI_ZONE)
    }

    fn adjust_expected_number(&self, request: &Packet, responses: &[Packet]) -> Expected {
        let Some(first) = responses.first() else {
            return Expected::Unknown;
        };
        let count = first.get("count").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        if count == 0 {
            return Expected::Exactly(responses.len());
        }

        let start = request
            .get("start_index")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize;
        let end = request
            .get("end_index")
            .and_then(|v| v.as_u64())
            .map_or(count - 1, |end| (end as usize).min(count - 1));
        if start > end {
            return Expected::Exactly(responses.len());
        }

        let zones = end - start + 1;
        let expected = if first.pkt_type() == STATE_MULTI_ZONE {
            zones.div_ceil(ZONES_PER_MULTI_ZONE)
        } else {
            zones
        };
        Expected::Exactly(expected)
    }
}

fn core() -> Result<Messages> {
    Messages::new()
        .with(message(45, [])?.build("Acknowledgement"))?
        .with(
            message(223, [Field::new("unhandled_type", FieldType::uint16())])?
                .build("StateUnhandled"),
        )
}

fn device() -> Result<Messages> {
    let set_power = message(21, [Field::new("level", FieldType::uint16())])?;
    let set_label = message(24, [Field::new("label", FieldType::string(32 * 8))])?;
    let echo = message(58, [Field::new("echoing", FieldType::bytes(64 * 8))])?;

    Messages::new()
        .with(message(20, [])?.build("GetPower"))?
        .with(set_power.build("SetPower"))?
        .with(set_power.using(22).build("StatePower"))?
        .with(message(23, [])?.build("GetLabel"))?
        .with(set_label.build("SetLabel"))?
        .with(set_label.using(25).build("StateLabel"))?
        .with(message(32, [])?.build("GetVersion"))?
        .with(
            message(
                33,
                [
                    Field::new("vendor", FieldType::uint32()),
                    Field::new("product", FieldType::uint32()),
                    Field::new("reserved6", FieldType::reserved(32)),
                ],
            )?
            .build("StateVersion"),
        )?
        .with(echo.build("EchoRequest"))?
        .with(echo.using(59).build("EchoResponse"))
}

fn light() -> Result<Messages> {
    Messages::new()
        .with(message(101, [])?.build("GetColor"))?
        .with(
            message(
                102,
                [
                    Field::new("reserved6", FieldType::reserved(8)),
                    Field::new("color", FieldType::Struct(hsbk()?)),
                    Field::new("duration", FieldType::uint32()),
                ],
            )?
            .build("SetColor"),
        )?
        .with(
            message(
                107,
                [
                    Field::new("color", FieldType::Struct(hsbk()?)),
                    Field::new("reserved6", FieldType::reserved(16)),
                    Field::new("power", FieldType::uint16()),
                    Field::new("label", FieldType::string(32 * 8)),
                    Field::new("reserved7", FieldType::reserved(64)),
                ],
            )?
            .build("LightState"),
        )
}

fn multizone() -> Result<Messages> {
    Messages::new()
        .with(
            message(
                502,
                [
                    Field::new("start_index", FieldType::uint8()),
                    Field::new("end_index", FieldType::uint8()).with_default(255u8),
                ],
            )?
            .with_multi(ColorZonesPolicy)
            .build("GetColorZones"),
        )?
        .with(
            message(
                STATE_ZONE,
                [
                    Field::new("count", FieldType::uint8()),
                    Field::new("index", FieldType::uint8()),
                    Field::new("color", FieldType::Struct(hsbk()?)),
                ],
            )?
            .build("StateZone"),
        )?
        .with(
            message(
                STATE_MULTI_ZONE,
                [
                    Field::new("count", FieldType::uint8()),
                    Field::new("index", FieldType::uint8()),
                    Field::new(
                        "colors",
                        FieldType::array(FieldType::Struct(hsbk()?), ZONES_PER_MULTI_ZONE),
                    ),
                ],
            )?
            .build("StateMultiZone"),
        )
}

fn tile() -> Result<Messages> {
    let get_64 = MultiOptions::new(
        |_request: &Packet, kind: &MessageType| {
            kind.protocol() == PROTOCOL_NUMBER && kind.pkt_type() == STATE_64
        },
        |request: &Packet, responses: &[Packet]| {
            let length = request.get("length").and_then(|v| v.as_u64()).unwrap_or(1);
            Max::new(length as usize).expected(responses.len())
        },
    );

    Messages::new()
        .with(
            message(
                707,
                [
                    Field::new("tile_index", FieldType::uint8()),
                    Field::new("length", FieldType::uint8()).with_default(1u8),
                    Field::new("reserved6", FieldType::reserved(8)),
                    Field::new("x", FieldType::uint8()),
                    Field::new("y", FieldType::uint8()),
                    Field::new("width", FieldType::uint8()).with_default(8u8),
                ],
            )?
            .with_multi(get_64)
            .build("Get64"),
        )?
        .with(
            message(
                STATE_64,
                [
                    Field::new("tile_index", FieldType::uint8()),
                    Field::new("reserved6", FieldType::reserved(8)),
                    Field::new("x", FieldType::uint8()),
                    Field::new("y", FieldType::uint8()),
                    Field::new("width", FieldType::uint8()),
                    Field::new("colors", FieldType::array(FieldType::Struct(hsbk()?), 64)),
                ],
            )?
            .build("State64"),
        )
}

/// Every known message, by group and combined.
#[derive(Debug, Clone)]
pub struct Catalog {
    core: Messages,
    device: Messages,
    light: Messages,
    multizone: Messages,
    tile: Messages,
    all: Messages,
}

impl Catalog {
    /// Declare every group and merge them.
    ///
    /// # Errors
    ///
    /// Returns a schema error if any declaration is invalid or two groups
    /// claim one packet type with different fields.
    pub fn load() -> Result<Self> {
        let core = core()?;
        let device = device()?;
        let light = light()?;
        let multizone = multizone()?;
        let tile = tile()?;

        let mut all = Messages::new();
        for group in [&core, &device, &light, &multizone, &tile] {
            all.extend(group)?;
        }
        tracing::debug!("Loaded {} message types", all.len());

        Ok(Self {
            core,
            device,
            light,
            multizone,
            tile,
            all,
        })
    }

    /// Acknowledgement and error replies.
    pub fn core(&self) -> &Messages {
        &self.core
    }

    /// Power, label, version and echo.
    pub fn device(&self) -> &Messages {
        &self.device
    }

    /// Single-colour lights.
    pub fn light(&self) -> &Messages {
        &self.light
    }

    /// Multi-zone strips.
    pub fn multizone(&self) -> &Messages {
        &self.multizone
    }

    /// Tile matrices.
    pub fn tile(&self) -> &Messages {
        &self.tile
    }

    /// All groups combined.
    pub fn all(&self) -> &Messages {
        &self.all
    }
}
