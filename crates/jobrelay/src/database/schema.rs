/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

diesel::table! {
    outbox_messages (id) {
        id -> Text,
        outbox_ref -> Text,
        method -> Text,
        group_id -> Text,
        message_index -> BigInt,
        content -> Nullable<Text>,
        has_content_stream -> Bool,
        attempts -> Integer,
        created_at -> Text,
    }
}

diesel::table! {
    outbox_groups (outbox_ref, group_id) {
        outbox_ref -> Text,
        group_id -> Text,
        current_index -> BigInt,
    }
}

diesel::allow_tables_to_appear_in_same_query!(outbox_messages, outbox_groups);
