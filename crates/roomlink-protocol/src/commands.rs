//! The room command table.
//!
//! Every remote capability of the embedded app is one row of
//! [`for_each_room_command!`]: the host-side method name, the enum variant,
//! the wire command name and how the method's arguments map onto payload
//! fields. A field mapped to `..` is spread into the payload instead of
//! being nested under a name.
//!
//! This crate expands the table into [`RoomCommand`] and [`COMMANDS`]; the
//! client expands the same table into the `Room` proxy methods, so the wire
//! contract is written down exactly once.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ProtocolError, ProtocolResult};

/// Invokes `$callback!` with the full room command table.
///
/// Row syntax: `method => Variant "wireName" (arg: Type => "field", ...);`
#[macro_export]
macro_rules! for_each_room_command {
    ($callback:ident) => {
        $callback! {
            /// Lists the media devices visible to the app.
            get_device_list => GetDeviceList "getDeviceList" ();
            /// Returns the local user's display name.
            get_user_name => GetUserName "getUserName" ();
            /// Returns the locale the app runs in.
            get_user_locale => GetUserLocale "getUserLocale" ();
            /// Returns the meeting lifecycle state.
            get_meeting_state => GetMeetingState "getMeetingState" ();

            /// Turns the local camera on.
            enable_camera => EnableCamera "enableCamera" (constraints: Option<$crate::Value> => "constraints");
            /// Turns the local camera off.
            disable_camera => DisableCamera "disableCamera" ();
            /// Cycles to the next camera.
            switch_camera => SwitchCamera "switchCamera" ();
            /// Selects a camera by device id.
            set_camera_device => SetCameraDevice "setCameraDevice" (device_id: String => "deviceId");
            /// Returns the local camera state.
            get_camera_state => GetCameraState "getCameraState" ();

            /// Turns the local microphone on.
            enable_microphone => EnableMicrophone "enableMicrophone" (constraints: Option<$crate::Value> => "constraints");
            /// Turns the local microphone off.
            disable_microphone => DisableMicrophone "disableMicrophone" ();
            /// Cycles to the next microphone.
            switch_microphone => SwitchMicrophone "switchMicrophone" ();
            /// Selects a microphone by device id.
            set_microphone_device => SetMicrophoneDevice "setMicrophoneDevice" (device_id: String => "deviceId");
            /// Returns the local microphone state.
            get_microphone_state => GetMicrophoneState "getMicrophoneState" ();

            /// Starts sharing the screen.
            start_screen_sharing => StartScreenSharing "startScreenSharing" (constraints: Option<$crate::Value> => "constraints");
            /// Stops sharing the screen.
            stop_screen_sharing => StopScreenSharing "stopScreenSharing" ();
            /// Returns the screen sharing state.
            get_screen_sharing_state => GetScreenSharingState "getScreenSharingState" ();

            /// Lists everyone in the meeting.
            get_participants => GetParticipants "getParticipants" ();
            /// Looks up one participant.
            get_participant_by_id => GetParticipantById "getParticipantById" (id: String => "id");
            /// Removes a participant and keeps them out until unblocked.
            block_participant => BlockParticipant "blockParticipant" (id: String => "id");
            /// Lets a blocked participant back in.
            unblock_participant => UnblockParticipant "unblockParticipant" (id: String => "id");
            /// Bans a participant from the meeting.
            ban_participant => BanParticipant "banParticipant" (id: String => "id");
            /// Renames the local participant.
            rename_participant => RenameParticipant "renameParticipant" (name: String => "name");
            /// Allows or forbids chat for a participant.
            set_chat_state => SetChatState "setChatState" (
                participant_id: String => "participantId",
                is_chat_allowed: bool => "isChatAllowed"
            );
            disable_participant_microphone => DisableParticipantMicrophone "disableParticipantMicrophone" (participant_id: String => "id");
            ask_to_enable_participant_microphone => AskToEnableParticipantMicrophone "askToEnableParticipantMicrophone" (participant_id: String => "id");
            block_participant_microphone => BlockParticipantMicrophone "blockParticipantMicrophone" (participant_id: String => "id");
            unblock_participant_microphone => UnblockParticipantMicrophone "unblockParticipantMicrophone" (participant_id: String => "id");
            disable_participant_camera => DisableParticipantCamera "disableParticipantCamera" (participant_id: String => "id");
            ask_to_enable_participant_camera => AskToEnableParticipantCamera "askToEnableParticipantCamera" (participant_id: String => "id");
            block_participant_camera => BlockParticipantCamera "blockParticipantCamera" (participant_id: String => "id");
            unblock_participant_camera => UnblockParticipantCamera "unblockParticipantCamera" (participant_id: String => "id");
            /// Changes a participant's role, e.g. `moderator`.
            set_participant_role => SetParticipantRole "setParticipantRole" (
                participant_id: String => "id",
                role: String => "role"
            );

            /// Switches the video layout.
            set_screen_layout => SetScreenLayout "setScreenLayout" (layout: String => "layout");
            start_meeting => StartMeeting "startMeeting" ();
            end_meeting => EndMeeting "endMeeting" ();
            /// Starts recording, optionally with a UI state for the recorder.
            start_recording => StartRecording "startRecording" (ui_state: Option<$crate::Value> => "uiState");
            set_recording_config => SetRecordingConfig "setRecordingConfig" (ui_state: $crate::Value => "uiState");
            stop_recording => StopRecording "stopRecording" ();
            get_recording_state => GetRecordingState "getRecordingState" ();

            /// Posts a message to the meeting chat.
            send_chat_message => SendChatMessage "sendChatMessage" (message: String => "message");

            /// Starts an RTMP stream.
            start_stream => StartStream "startStream" (
                server_url: String => "serverUrl",
                stream_key: String => "streamKey"
            );
            /// Stops one RTMP stream.
            stop_stream => StopStream "stopStream" (
                server_url: String => "serverUrl",
                stream_key: String => "streamKey"
            );
            stop_all_streams => StopAllStreams "stopAllStreams" ();

            /// Applies an already-serialized UI configuration object.
            update_ui_config => UpdateUiConfig "updateUIConfig" (config: $crate::Value => ..);
        }
    };
}

/// Wire description of one row of the command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    /// Host-side method name.
    pub method: &'static str,
    /// Command name on the wire.
    pub command: &'static str,
    /// Payload field names, in argument order. `..` marks a spread argument.
    pub fields: &'static [&'static str],
}

macro_rules! shape_field {
    ($fields:ident, .., $value:expr) => {
        spread_field(&mut $fields, $value)
    };
    ($fields:ident, $name:literal, $value:expr) => {
        insert_field(&mut $fields, $name, $value)
    };
}

macro_rules! field_name {
    (..) => {
        ".."
    };
    ($name:literal) => {
        $name
    };
}

macro_rules! define_room_commands {
    (
        $(
            $(#[$meta:meta])*
            $method:ident => $variant:ident $wire:literal (
                $( $arg:ident : $ty:ty => $field:tt ),* $(,)?
            );
        )*
    ) => {
        /// A remote command, with its arguments.
        #[derive(Debug, Clone, PartialEq)]
        pub enum RoomCommand {
            $(
                $(#[$meta])*
                $variant { $( $arg: $ty ),* },
            )*
        }

        impl RoomCommand {
            $(
                $(#[$meta])*
                pub fn $method($( $arg: impl Into<$ty> ),*) -> Self {
                    Self::$variant { $( $arg: $arg.into() ),* }
                }
            )*

            /// Command name on the wire.
            pub fn command(&self) -> &'static str {
                match self {
                    $( Self::$variant { .. } => $wire, )*
                }
            }

            /// Host-side method name.
            pub fn method(&self) -> &'static str {
                match self {
                    $( Self::$variant { .. } => stringify!($method), )*
                }
            }

            /// Shapes the arguments into the request payload.
            pub fn payload(&self) -> ProtocolResult<Value> {
                match self {
                    $(
                        Self::$variant { $( $arg ),* } => {
                            #[allow(unused_mut)]
                            let mut fields = Map::new();
                            $( shape_field!(fields, $field, $arg)?; )*
                            Ok(Value::Object(fields))
                        }
                    )*
                }
            }
        }

        /// Every row of the command table, in declaration order.
        pub const COMMANDS: &[CommandSpec] = &[
            $(
                CommandSpec {
                    method: stringify!($method),
                    command: $wire,
                    fields: &[ $( field_name!($field) ),* ],
                },
            )*
        ];
    };
}

for_each_room_command!(define_room_commands);

impl RoomCommand {
    /// Wire name and payload together.
    pub fn into_parts(self) -> ProtocolResult<(&'static str, Value)> {
        let payload = self.payload()?;
        Ok((self.command(), payload))
    }
}

/// Looks up a row of the table by wire command name.
pub fn command_spec(command: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.command == command)
}

fn insert_field<T: Serialize>(
    fields: &mut Map<String, Value>,
    name: &str,
    value: &T,
) -> ProtocolResult<()> {
    fields.insert(name.to_string(), serde_json::to_value(value)?);
    Ok(())
}

fn spread_field(fields: &mut Map<String, Value>, value: &Value) -> ProtocolResult<()> {
    match value {
        Value::Null => Ok(()),
        Value::Object(entries) => {
            for (key, entry) in entries {
                fields.insert(key.clone(), entry.clone());
            }
            Ok(())
        }
        other => Err(ProtocolError::not_object(other)),
    }
}
