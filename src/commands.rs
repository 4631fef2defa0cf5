//! Camera command set
//!
//! Thin wrappers over [`Session::call`] for the RPC methods the camera
//! understands, plus the two-step setting change.

use serde_json::{json, Value};

use crate::protocol::METHOD_SETTING_APPLIED;
use crate::rpc::RpcMessage;
use crate::session::{Result, Session};
use crate::transport::Transport;

/// Read every camera setting
pub const METHOD_ALL_SETTINGS_GET: &str = "dxo_all_settings_get";
/// Read battery, storage and mode status
pub const METHOD_CAMERA_STATUS_GET: &str = "dxo_camera_status_get";
/// Push a GPS fix to the camera
pub const METHOD_GPS_DATA_SET: &str = "dxo_gps_data_set";
/// Read the digital zoom factor
pub const METHOD_DIGITAL_ZOOM_GET: &str = "dxo_digital_zoom_get";
/// Focus at a point
pub const METHOD_TAP_TO_FOCUS: &str = "dxo_tap_to_focus";
/// Trigger the shutter
pub const METHOD_PHOTO_TAKE: &str = "dxo_photo_take";
/// Put the camera to sleep
pub const METHOD_IDLE: &str = "dxo_idle";
/// Fetch the last captured file, or its path when called without parameters
pub const METHOD_FS_LAST_FILE_GET: &str = "dxo_fs_last_file_get";
/// Abort a file transfer
pub const METHOD_FS_CANCEL_GET: &str = "dxo_fs_cancel_get";
/// Switch between capture modes
pub const METHOD_CAMERA_MODE_SWITCH: &str = "dxo_camera_mode_switch";
/// Change one setting
pub const METHOD_SETTING_SET: &str = "dxo_setting_set";

/// Side length of the tap-to-focus window
const FOCUS_WINDOW: u32 = 256;

/// Upper bound of the manual focus inverse distance
const MF_INV_DISTANCE_MAX: f64 = 5.0;

/// Setting type names
pub mod kind {
    /// RAW capture on/off
    pub const RAW: &str = "raw";
    /// Temporal noise reduction
    pub const TNR: &str = "tnr";
    /// AF or MF for stills
    pub const STILL_FOCUSING_MODE: &str = "still_focusing_mode";
    /// AF behavior (af-od, af-c, af-s)
    pub const AF_MODE: &str = "af_mode";
    /// Manual focus inverse distance
    pub const MF_INV_DISTANCE: &str = "mf_inv_distance";
    /// Sensitivity
    pub const ISO: &str = "iso";
    /// Exposure compensation
    pub const EV_BIAS: &str = "ev_bias";
    /// F-number
    pub const APERTURE: &str = "aperture";
    /// Shutter speed as a fraction
    pub const EXPOSURE_TIME: &str = "exposure_time";
    /// Scene or PASM mode
    pub const SHOOTING_MODE: &str = "shooting_mode";
    /// Single shot or timelapse
    pub const DRIVE: &str = "drive";
    /// Self-timer delay in seconds
    pub const SELFTIMER: &str = "selftimer";
    /// Auto lighting strength
    pub const LIGHTING_INTENSITY: &str = "lighting_intensity";
    /// JPEG quality
    pub const PHOTO_QUALITY: &str = "photo_quality";
    /// Auto ISO ceiling
    pub const ISO_BOUNDARIES: &str = "iso_boundaries";
    /// Auto shutter ceiling
    pub const MAX_EXPOSURE: &str = "max_exposure";
    /// Copyright string written to EXIF
    pub const COPYRIGHT: &str = "copyright";
    /// Artist string written to EXIF
    pub const ARTIST: &str = "artist";
    /// Video bitrate
    pub const VIDEO_QUALITY: &str = "video_quality";
}

/// A setting change request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Setting {
    /// Setting type, one of the [`kind`] names
    pub kind: String,
    /// Value as the camera expects it
    pub param: String,
}

impl Setting {
    /// Any setting with a preformatted value
    pub fn new(kind: impl Into<String>, param: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            param: param.into(),
        }
    }

    /// Copyright text embedded in captured files
    pub fn copyright(text: impl Into<String>) -> Self {
        Self::new(kind::COPYRIGHT, text)
    }

    /// Artist text embedded in captured files
    pub fn artist(text: impl Into<String>) -> Self {
        Self::new(kind::ARTIST, text)
    }

    /// Manual focus inverse distance, clamped to 0..=5
    pub fn mf_inv_distance(distance: f64) -> Self {
        let clamped = if distance.is_nan() {
            0.0
        } else {
            distance.clamp(0.0, MF_INV_DISTANCE_MAX)
        };
        Self::new(kind::MF_INV_DISTANCE, format!("{:.6}", clamped))
    }

    /// RPC parameters for `dxo_setting_set`
    pub fn to_params(&self) -> Value {
        json!({ "type": self.kind, "param": self.param })
    }
}

/// Format the tap-to-focus window; the origin is the bottom left corner
fn focus_window(x: u32, y: u32, size: u32) -> String {
    format!("[{},{},{},{}]", x, y, size, size)
}

impl<T: Transport> Session<T> {
    /// Read every camera setting
    ///
    /// # Errors
    ///
    /// Transport and encoding failures; see [`Session::call`].
    pub async fn get_all_settings(&mut self) -> Result<Option<RpcMessage>> {
        self.call(METHOD_ALL_SETTINGS_GET, None).await
    }

    /// Read camera status
    ///
    /// # Errors
    ///
    /// Transport and encoding failures; see [`Session::call`].
    pub async fn get_status(&mut self) -> Result<Option<RpcMessage>> {
        self.call(METHOD_CAMERA_STATUS_GET, None).await
    }

    /// Push a GPS fix in the camera's text form
    ///
    /// # Errors
    ///
    /// Transport and encoding failures; see [`Session::call`].
    pub async fn set_gps_data(&mut self, fix: &str) -> Result<Option<RpcMessage>> {
        self.call(METHOD_GPS_DATA_SET, Some(&json!({ "param": fix })))
            .await
    }

    /// Read the current digital zoom
    ///
    /// # Errors
    ///
    /// Transport and encoding failures; see [`Session::call`].
    pub async fn get_digital_zoom(&mut self) -> Result<Option<RpcMessage>> {
        self.call(METHOD_DIGITAL_ZOOM_GET, Some(&json!({ "type": "current" })))
            .await
    }

    /// Focus at a point measured from the bottom left corner
    ///
    /// # Errors
    ///
    /// Transport and encoding failures; see [`Session::call`].
    pub async fn focus(&mut self, x: u32, y: u32) -> Result<Option<RpcMessage>> {
        let param = focus_window(x, y, FOCUS_WINDOW);
        self.call(METHOD_TAP_TO_FOCUS, Some(&json!({ "param": param })))
            .await
    }

    /// Send an empty focus window
    ///
    /// # Errors
    ///
    /// Transport and encoding failures; see [`Session::call`].
    pub async fn flush_focus(&mut self) -> Result<Option<RpcMessage>> {
        let param = focus_window(0, 0, 0);
        self.call(METHOD_TAP_TO_FOCUS, Some(&json!({ "param": param })))
            .await
    }

    /// Trigger the shutter
    ///
    /// # Errors
    ///
    /// Transport and encoding failures; see [`Session::call`].
    pub async fn take_photo(&mut self) -> Result<Option<RpcMessage>> {
        self.call(METHOD_PHOTO_TAKE, None).await
    }

    /// Put the camera to sleep
    ///
    /// # Errors
    ///
    /// Transport and encoding failures; see [`Session::call`].
    pub async fn sleep(&mut self) -> Result<Option<RpcMessage>> {
        self.call(METHOD_IDLE, None).await
    }

    /// Request a chunk of a file stored on the camera
    ///
    /// # Errors
    ///
    /// Transport and encoding failures; see [`Session::call`].
    pub async fn fetch_file(
        &mut self,
        path: &str,
        offset: u64,
        fetch_size: u64,
    ) -> Result<Option<RpcMessage>> {
        let params = json!({ "param": path, "offset": offset, "fetch_size": fetch_size });
        self.call(METHOD_FS_LAST_FILE_GET, Some(&params)).await
    }

    /// Ask for the path of the last captured file
    ///
    /// # Errors
    ///
    /// Transport and encoding failures; see [`Session::call`].
    pub async fn last_file_path(&mut self) -> Result<Option<RpcMessage>> {
        self.call(METHOD_FS_LAST_FILE_GET, None).await
    }

    /// Abort a file transfer
    ///
    /// # Errors
    ///
    /// Transport and encoding failures; see [`Session::call`].
    pub async fn cancel_file_get(&mut self) -> Result<Option<RpcMessage>> {
        self.call(METHOD_FS_CANCEL_GET, None).await
    }

    /// Change a setting and wait for the camera to confirm it
    ///
    /// The camera first answers `dxo_setting_applied`, then sends a confirmation
    /// echoing the request id and the setting type. Returns `true` only when both
    /// match; any other first answer means the change was refused.
    ///
    /// # Errors
    ///
    /// Transport and encoding failures; see [`Session::call`].
    pub async fn apply_setting(&mut self, setting: &Setting) -> Result<bool> {
        let id = self
            .send_request(METHOD_SETTING_SET, Some(&setting.to_params()))
            .await?;

        let applied = self.decode_next().await?.into_message();
        if applied.as_ref().and_then(RpcMessage::method_name) != Some(METHOD_SETTING_APPLIED) {
            log::warn!(
                "Setting {}={} not applied: {:?}",
                setting.kind,
                setting.param,
                applied
            );
            return Ok(false);
        }

        let Some(confirmation) = self.decode_next().await?.into_message() else {
            log::warn!("No confirmation for setting {}", setting.kind);
            return Ok(false);
        };

        let confirmed_kind = confirmation
            .result
            .as_ref()
            .and_then(|result| result.get("type"))
            .and_then(Value::as_str);
        let confirmed = confirmation.sequence_id() == Some(id)
            && confirmed_kind == Some(setting.kind.as_str());

        if confirmed {
            log::info!("Setting {}={} applied", setting.kind, setting.param);
        } else {
            log::warn!(
                "Setting confirmation mismatch: expected id {} type {}, got {:?} {:?}",
                id,
                setting.kind,
                confirmation.id,
                confirmed_kind
            );
        }
        Ok(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::protocol::ACK_SIGNATURE;
    use crate::rpc::encode_request;
    use crate::test_utils::{PacketGenerator, ScriptedTransport};

    fn session_with_answers(answers: &[Value]) -> Session<ScriptedTransport> {
        let gen = PacketGenerator::default();
        let packets = answers.iter().flat_map(|a| gen.rpc_packets(a)).collect();
        Session::new(ScriptedTransport::new(packets), SessionConfig::default())
    }

    #[test]
    fn test_mf_inv_distance_clamped_and_formatted() {
        assert_eq!(Setting::mf_inv_distance(1.5).param, "1.500000");
        assert_eq!(Setting::mf_inv_distance(-2.0).param, "0.000000");
        assert_eq!(Setting::mf_inv_distance(9.0).param, "5.000000");
        assert_eq!(Setting::mf_inv_distance(f64::NAN).param, "0.000000");
    }

    #[test]
    fn test_free_text_settings() {
        let setting = Setting::artist("Ada");
        assert_eq!(setting.kind, "artist");
        assert_eq!(setting.to_params(), json!({ "type": "artist", "param": "Ada" }));
        assert_eq!(Setting::copyright("(c) 2024").param, "(c) 2024");
    }

    #[test]
    fn test_focus_window_format() {
        assert_eq!(focus_window(10, 20, FOCUS_WINDOW), "[10,20,256,256]");
        assert_eq!(focus_window(0, 0, 0), "[0,0,0,0]");
    }

    #[tokio::test]
    async fn test_focus_request_params() {
        let mut session = session_with_answers(&[json!({ "id": 0, "result": {} })]);
        session.focus(120, 340).await.unwrap();

        let expected = encode_request(
            0,
            METHOD_TAP_TO_FOCUS,
            Some(&json!({ "param": "[120,340,256,256]" })),
        )
        .unwrap();
        assert_eq!(session.transport().sent()[1], expected);
    }

    #[tokio::test]
    async fn test_fetch_file_params() {
        let mut session = session_with_answers(&[json!({ "id": 0, "result": {} })]);
        session.fetch_file("/DCIM/100DXO/IMG_0001.JPG", 512, 4096).await.unwrap();

        let params = json!({ "param": "/DCIM/100DXO/IMG_0001.JPG", "offset": 512, "fetch_size": 4096 });
        let expected = encode_request(0, METHOD_FS_LAST_FILE_GET, Some(&params)).unwrap();
        assert_eq!(session.transport().sent()[1], expected);
    }

    #[tokio::test]
    async fn test_apply_setting_confirmed() {
        let mut session = session_with_answers(&[
            json!({ "jsonrpc": "2.0", "method": "dxo_setting_applied" }),
            json!({ "jsonrpc": "2.0", "id": 0, "result": { "type": "iso", "param": "iso400" } }),
        ]);

        let applied = session.apply_setting(&Setting::new(kind::ISO, "iso400")).await.unwrap();
        assert!(applied);

        let sent = session.transport().sent();
        assert_eq!(sent[0], ACK_SIGNATURE);
        let params = json!({ "type": "iso", "param": "iso400" });
        assert_eq!(sent[1], encode_request(0, METHOD_SETTING_SET, Some(&params)).unwrap());
    }

    #[tokio::test]
    async fn test_apply_setting_wrong_type() {
        let mut session = session_with_answers(&[
            json!({ "method": "dxo_setting_applied" }),
            json!({ "id": 0, "result": { "type": "aperture" } }),
        ]);

        assert!(!session.apply_setting(&Setting::new(kind::ISO, "auto")).await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_setting_wrong_id() {
        let mut session = session_with_answers(&[
            json!({ "method": "dxo_setting_applied" }),
            json!({ "id": 7, "result": { "type": "iso" } }),
        ]);

        assert!(!session.apply_setting(&Setting::new(kind::ISO, "auto")).await.unwrap());
    }

    #[tokio::test]
    async fn test_apply_setting_refused_reads_once() {
        let mut session = session_with_answers(&[
            json!({ "id": 0, "error": { "code": -1 } }),
            json!({ "id": 0, "result": { "type": "iso" } }),
        ]);

        assert!(!session.apply_setting(&Setting::new(kind::ISO, "auto")).await.unwrap());
        // The second transfer is left unread
        assert!(session.transport().remaining() > 0);
    }
}
