// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::Result;
use crate::value::Value;

pub const CMT_INDEX_TYPE: &str = "cmtIdx";
pub const CMT_INDEX_VERSION: &str = "0.0.1";
pub const CMT_SUBSCRIBER: &str = "cmtSubscriber";
pub const VERSION_INDEX: &str = "versionIndex";

// Subscription records: one per indexed type, keyed by that type.
const CMT_INDEX_SCHEMA: &str = r##"{
    "name": "cmtIdx",
    "version": "0.0.1",
    "description": "reverse index subscriptions of one referenced type",
    "key": "{dataType}",
    "properties": {
        "dataType": {
            "type": "string"
        },
        "cmtSubscriber": {
            "type": "map",
            "items": {
                "type": "object",
                "$ref": "#/definitions/subscriber"
            }
        }
    },
    "definitions": {
        "subscriber": {
            "name": "subscriber",
            "key": "{dataType}",
            "properties": {
                "dataType": {
                    "type": "string"
                },
                "versionIndex": {
                    "type": "map",
                    "items": {
                        "type": "object",
                        "$ref": "#/definitions/versionIndex"
                    }
                }
            }
        },
        "versionIndex": {
            "name": "versionIndex",
            "key": "{version}",
            "properties": {
                "version": {
                    "type": "string"
                },
                "indexTemplate": {
                    "type": "array",
                    "items": {
                        "type": "string"
                    }
                }
            }
        }
    }
}"##;

pub fn cmt_index_schema() -> Result<Value> {
    Ok(Value::from_json_str(CMT_INDEX_SCHEMA)?)
}
