// Diesel schema definitions for the live, summary, archive, and sector
// tables described in spec.md §3 and §6. Hand-maintained (no live database
// to run `diesel print-schema` against in this environment) but structured
// the way the teacher's generated schema.rs is: one `diesel::table!` block
// per table, plain SQL types, enums stored as `Varchar` and converted at the
// model boundary (see flights.rs / controllers.rs).

diesel::table! {
    flights (id) {
        id -> Uuid,
        callsign -> Varchar,
        cid -> Int4,
        logon_time -> Timestamptz,
        name -> Nullable<Varchar>,
        latitude -> Nullable<Float8>,
        longitude -> Nullable<Float8>,
        altitude -> Nullable<Int4>,
        groundspeed -> Nullable<Int4>,
        heading -> Nullable<Int4>,
        transponder -> Nullable<Varchar>,
        departure -> Nullable<Varchar>,
        arrival -> Nullable<Varchar>,
        route -> Nullable<Text>,
        flight_rules -> Nullable<Varchar>,
        aircraft_type -> Nullable<Varchar>,
        aircraft_faa -> Nullable<Varchar>,
        aircraft_short -> Nullable<Varchar>,
        planned_altitude -> Nullable<Varchar>,
        deptime -> Nullable<Varchar>,
        enroute_time -> Nullable<Varchar>,
        fuel_time -> Nullable<Varchar>,
        remarks -> Nullable<Text>,
        last_updated -> Timestamptz,
    }
}

diesel::table! {
    controllers (id) {
        id -> Uuid,
        callsign -> Varchar,
        cid -> Int4,
        logon_time -> Timestamptz,
        name -> Nullable<Varchar>,
        facility -> Nullable<Int4>,
        rating -> Nullable<Int4>,
        frequency -> Nullable<Varchar>,
        visual_range -> Nullable<Int4>,
        text_atis -> Nullable<Text>,
        status -> Varchar,
        last_updated -> Timestamptz,
        last_seen -> Timestamptz,
    }
}

diesel::table! {
    transceivers (id) {
        id -> Uuid,
        callsign -> Varchar,
        transceiver_id -> Int4,
        entity_type -> Varchar,
        frequency_hz -> Nullable<Int8>,
        lat_deg -> Nullable<Float8>,
        lon_deg -> Nullable<Float8>,
        height_msl_m -> Nullable<Float8>,
        height_agl_m -> Nullable<Float8>,
        sampled_at -> Timestamptz,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    sectors (name) {
        name -> Varchar,
        vertices -> Jsonb,
        floor_altitude -> Nullable<Int4>,
        ceiling_altitude -> Nullable<Int4>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    flight_sector_occupancy (id) {
        id -> Uuid,
        callsign -> Varchar,
        sector_name -> Varchar,
        entry_timestamp -> Timestamptz,
        entry_lat -> Float8,
        entry_lon -> Float8,
        entry_altitude -> Nullable<Int4>,
        exit_timestamp -> Nullable<Timestamptz>,
        last_lat -> Float8,
        last_lon -> Float8,
        last_alt -> Nullable<Int4>,
        duration_seconds -> Nullable<Int8>,
    }
}

diesel::table! {
    flight_summaries (id) {
        id -> Uuid,
        callsign -> Varchar,
        cid -> Int4,
        session_start_time -> Timestamptz,
        session_end_time -> Timestamptz,
        duration_minutes -> Float8,
        departure -> Nullable<Varchar>,
        arrival -> Nullable<Varchar>,
        route -> Nullable<Text>,
        flight_rules -> Nullable<Varchar>,
        aircraft_type -> Nullable<Varchar>,
        planned_altitude -> Nullable<Varchar>,
        remarks -> Nullable<Text>,
        min_altitude -> Nullable<Int4>,
        max_altitude -> Nullable<Int4>,
        max_groundspeed -> Nullable<Int4>,
        distinct_transponders -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    controller_summaries (id) {
        id -> Uuid,
        callsign -> Varchar,
        cid -> Int4,
        session_start_time -> Timestamptz,
        session_end_time -> Timestamptz,
        session_duration_minutes -> Float8,
        facility -> Nullable<Int4>,
        frequencies_used -> Jsonb,
        total_aircraft_handled -> Int4,
        peak_aircraft_count -> Int4,
        hourly_aircraft_breakdown -> Jsonb,
        aircraft_details -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    flights_archive (id) {
        id -> Uuid,
        callsign -> Varchar,
        cid -> Int4,
        logon_time -> Timestamptz,
        name -> Nullable<Varchar>,
        latitude -> Nullable<Float8>,
        longitude -> Nullable<Float8>,
        altitude -> Nullable<Int4>,
        groundspeed -> Nullable<Int4>,
        heading -> Nullable<Int4>,
        transponder -> Nullable<Varchar>,
        departure -> Nullable<Varchar>,
        arrival -> Nullable<Varchar>,
        route -> Nullable<Text>,
        flight_rules -> Nullable<Varchar>,
        aircraft_type -> Nullable<Varchar>,
        aircraft_faa -> Nullable<Varchar>,
        aircraft_short -> Nullable<Varchar>,
        planned_altitude -> Nullable<Varchar>,
        deptime -> Nullable<Varchar>,
        enroute_time -> Nullable<Varchar>,
        fuel_time -> Nullable<Varchar>,
        remarks -> Nullable<Text>,
        last_updated -> Timestamptz,
        archived_at -> Timestamptz,
    }
}

diesel::table! {
    controllers_archive (id) {
        id -> Uuid,
        callsign -> Varchar,
        cid -> Int4,
        logon_time -> Timestamptz,
        name -> Nullable<Varchar>,
        facility -> Nullable<Int4>,
        rating -> Nullable<Int4>,
        frequency -> Nullable<Varchar>,
        visual_range -> Nullable<Int4>,
        text_atis -> Nullable<Text>,
        status -> Varchar,
        last_updated -> Timestamptz,
        last_seen -> Timestamptz,
        archived_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(flights, flight_summaries);
diesel::allow_tables_to_appear_in_same_query!(controllers, controller_summaries);
