// Licensed under the Apache-2.0 license

mod board_bringup;
mod bus_serialization;
